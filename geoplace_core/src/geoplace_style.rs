//! Annotation styles.
//!
//! A [`Style`] bundles the appearance options of a class of annotations.
//! Styles are built once, frozen into an `Arc`, and shared read-only by
//! every annotation that uses them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Horizontal advance of a narrow (ASCII) glyph, in font sizes
const NARROW_ADVANCE: f64 = 0.6;

/// Horizontal advance of a wide (CJK etc.) glyph, in font sizes
const WIDE_ADVANCE: f64 = 1.0;

/// Line height, in font sizes
const LINE_SPACING: f64 = 1.2;

// ============================================================================
// COLOR
// ============================================================================

/// Linear RGBA colour with components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const YELLOW: Color = Color::rgba(1.0, 1.0, 0.0, 1.0);
    pub const RED: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::rgba(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::rgba(0.0, 0.0, 1.0, 1.0);
    pub const GRAY: Color = Color::rgba(0.5, 0.5, 0.5, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// 8-bit components, rounded.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl FromStr for Color {
    type Err = StyleError;

    /// Parses `#rrggbb`, `#rrggbbaa` or a basic colour name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StyleError::InvalidColor(s.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
                return Err(invalid());
            }
            let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
            let alpha = if hex.len() == 8 { byte(6)? } else { 255 };
            return Ok(Color::from_rgba8(byte(0)?, byte(2)?, byte(4)?, alpha));
        }

        match s.to_lowercase().as_str() {
            "white" => Ok(Color::WHITE),
            "black" => Ok(Color::BLACK),
            "yellow" => Ok(Color::YELLOW),
            "red" => Ok(Color::RED),
            "green" => Ok(Color::GREEN),
            "blue" => Ok(Color::BLUE),
            "gray" | "grey" => Ok(Color::GRAY),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = StyleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        let [r, g, b, a] = color.to_rgba8();
        format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
    }
}

// ============================================================================
// TEXT OPTIONS
// ============================================================================

/// Where a text box sits relative to its anchor point.
///
/// `LeftTop` puts the anchor at the box's left-top corner, `CenterCenter`
/// centres the box on the anchor, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextAlignment {
    LeftTop,
    LeftCenter,
    LeftBottom,
    CenterTop,
    #[default]
    CenterCenter,
    CenterBottom,
    RightTop,
    RightCenter,
    RightBottom,
}

impl TextAlignment {
    /// Offset of the box's top-left corner from the anchor, for a box of
    /// `width` × `height` pixels (screen y grows downwards).
    pub fn box_offset(&self, width: f64, height: f64) -> (f64, f64) {
        use TextAlignment::*;
        let dx = match self {
            LeftTop | LeftCenter | LeftBottom => 0.0,
            CenterTop | CenterCenter | CenterBottom => -width / 2.0,
            RightTop | RightCenter | RightBottom => -width,
        };
        let dy = match self {
            LeftTop | CenterTop | RightTop => 0.0,
            LeftCenter | CenterCenter | RightCenter => -height / 2.0,
            LeftBottom | CenterBottom | RightBottom => -height,
        };
        (dx, dy)
    }
}

/// Character encoding of label strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextEncoding {
    /// One glyph per byte
    #[default]
    Ascii,
    Utf8,
    Utf16,
    Utf32,
}

// ============================================================================
// SYMBOLS
// ============================================================================

/// The kinds of symbol a style can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Icon,
    Text,
    Model,
}

/// Icon (billboard image) options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconSymbol {
    /// Image path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<PathBuf>,

    /// Take part in screen-space decluttering
    pub declutter: bool,

    /// Screen-space scale of the image
    pub scale: f64,
}

impl Default for IconSymbol {
    fn default() -> Self {
        Self {
            url: None,
            declutter: false,
            scale: 1.0,
        }
    }
}

/// Text label options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSymbol {
    /// Box position relative to the anchor. Places ignore it and always
    /// put their text left-centre aligned to the right of the icon.
    pub alignment: TextAlignment,

    pub fill: Color,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub halo: Option<Color>,

    pub encoding: TextEncoding,

    /// Font file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,

    /// Font size in pixels
    pub size: f64,

    /// Screen offset of the text from its anchor, in pixels (y down)
    pub pixel_offset: [f64; 2],

    /// Take part in screen-space decluttering
    pub declutter: bool,
}

impl Default for TextSymbol {
    fn default() -> Self {
        Self {
            alignment: TextAlignment::default(),
            fill: Color::WHITE,
            halo: None,
            encoding: TextEncoding::default(),
            font: None,
            size: 16.0,
            pixel_offset: [0.0, 0.0],
            declutter: true,
        }
    }
}

impl TextSymbol {
    /// Number of glyphs `text` renders as under this encoding.
    pub fn glyph_count(&self, text: &str) -> usize {
        match self.encoding {
            TextEncoding::Ascii => text.len(),
            _ => text.chars().count(),
        }
    }

    /// Approximate screen extent (width, height) of `text` in pixels.
    ///
    /// Lines are split on `\n`; non-ASCII glyphs are counted full width.
    pub fn measure(&self, text: &str) -> (f64, f64) {
        let mut width: f64 = 0.0;
        let mut lines = 0usize;
        for line in text.split('\n') {
            lines += 1;
            let advance: f64 = match self.encoding {
                TextEncoding::Ascii => line.len() as f64 * NARROW_ADVANCE,
                _ => line
                    .chars()
                    .map(|c| if c.is_ascii() { NARROW_ADVANCE } else { WIDE_ADVANCE })
                    .sum(),
            };
            width = width.max(advance * self.size);
        }
        (width, lines as f64 * self.size * LINE_SPACING)
    }
}

/// 3-D model options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSymbol {
    /// Model path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<PathBuf>,

    /// Keep a constant on-screen size; when off the model keeps its
    /// authored size at every distance
    pub auto_scale: bool,
}

// ============================================================================
// STYLE
// ============================================================================

/// A declarative bundle of symbol options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<IconSymbol>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextSymbol>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSymbol>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// The icon symbol, created with defaults if absent.
    pub fn icon_mut(&mut self) -> &mut IconSymbol {
        self.icon.get_or_insert_with(IconSymbol::default)
    }

    /// The text symbol, created with defaults if absent.
    pub fn text_mut(&mut self) -> &mut TextSymbol {
        self.text.get_or_insert_with(TextSymbol::default)
    }

    /// The model symbol, created with defaults if absent.
    pub fn model_mut(&mut self) -> &mut ModelSymbol {
        self.model.get_or_insert_with(ModelSymbol::default)
    }

    pub fn has(&self, kind: SymbolKind) -> bool {
        match kind {
            SymbolKind::Icon => self.icon.is_some(),
            SymbolKind::Text => self.text.is_some(),
            SymbolKind::Model => self.model.is_some(),
        }
    }

    /// Symbol kinds present in this style.
    pub fn kinds(&self) -> Vec<SymbolKind> {
        [SymbolKind::Icon, SymbolKind::Text, SymbolKind::Model]
            .into_iter()
            .filter(|k| self.has(*k))
            .collect()
    }

    /// True if any 2-D symbol asks for decluttering.
    pub fn declutter_enabled(&self) -> bool {
        self.icon.as_ref().is_some_and(|i| i.declutter) || self.text.as_ref().is_some_and(|t| t.declutter)
    }

    /// Freezes the style for sharing.
    pub fn into_shared(self) -> Arc<Style> {
        Arc::new(self)
    }
}

/// Errors for style options.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StyleError {
    #[error("Invalid color: {0}")]
    InvalidColor(String),
}
