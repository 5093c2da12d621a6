//! The "SCENE" Engine - composing annotations on a map
//!
//! The [`SceneComposer`] owns a group of annotations anchored on one map.
//! It is handed its [`MapContext`] explicitly and never searches for one.
//!
//! ## Composition
//! Each request is placed, its assets are loaded, and it is attached to the
//! group, optionally under a distance-switched [`LodGate`]. One failing
//! request never prevents the others from composing.
//!
//! ## Frames
//! [`SceneComposer::evaluate_frame`] recomputes visibility for a camera:
//! LOD gating, view and horizon culling, then decluttering of the 2-D
//! annotations that ask for it. Degraded placements are re-resolved lazily
//! at the start of each frame.

use crate::geoplace_camera::{Camera, ScreenPoint};
use crate::geoplace_declutter::{DeclutterCandidate, DeclutterEngine};
use crate::geoplace_lod::{LodError, LodGate, LodRange, LodState};
use crate::geoplace_placement::{Placement, PlacementError, PlacementResolver};
use crate::geoplace_srs::{GeodeticPoint, Reprojector, SpatialReference, StandardReprojector};
use crate::geoplace_style::{Style, SymbolKind, TextAlignment, TextSymbol};
use crate::metrics::FrameMetrics;
use geo::{coord, Rect};
use geoplace_env::{AnnotationId, AssetLoader, ElevationSource, EnvError, ModelAsset};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Size of the marker drawn when a place's icon image is missing
    pub placeholder_icon_size: (u32, u32),

    /// Gap between a place's icon and its text, in pixels
    pub place_label_gap_px: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            placeholder_icon_size: (16, 16),
            place_label_gap_px: 2.0,
        }
    }
}

// ============================================================================
// MAP CONTEXT
// ============================================================================

/// The map an annotation group is anchored on.
#[derive(Clone)]
pub struct MapContext {
    pub name: String,

    /// Map SRS (any kind; placement uses its geographic counterpart)
    pub srs: Arc<SpatialReference>,

    pub elevation: Arc<dyn ElevationSource>,
}

impl MapContext {
    pub fn new(name: impl Into<String>, srs: Arc<SpatialReference>, elevation: Arc<dyn ElevationSource>) -> Self {
        Self {
            name: name.into(),
            srs,
            elevation,
        }
    }
}

impl std::fmt::Debug for MapContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapContext")
            .field("name", &self.name)
            .field("srs", &self.srs.name())
            .finish_non_exhaustive()
    }
}

/// Produces a map from a scene descriptor.
pub trait MapLoader {
    /// # Errors
    /// [`ComposeError::MapNotFound`] when the descriptor yields no map.
    fn load(&self, descriptor: &str) -> Result<MapContext, ComposeError>;
}

/// A fixed registry of named maps.
#[derive(Debug, Clone, Default)]
pub struct StaticMapLoader {
    maps: HashMap<String, MapContext>,
}

impl StaticMapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self, map: MapContext) -> Self {
        self.maps.insert(map.name.clone(), map);
        self
    }

    /// Registered map names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.maps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl MapLoader for StaticMapLoader {
    fn load(&self, descriptor: &str) -> Result<MapContext, ComposeError> {
        self.maps
            .get(descriptor)
            .cloned()
            .ok_or_else(|| ComposeError::MapNotFound(descriptor.to_string()))
    }
}

// ============================================================================
// REQUESTS & NODES
// ============================================================================

/// What an annotation shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationContent {
    /// Icon plus text
    Place { text: String },

    /// Text only
    Label { text: String },

    /// 3-D model; `url` overrides the style's model url
    Model {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<PathBuf>,
    },
}

/// A request to add one annotation.
#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    pub point: GeodeticPoint,
    pub content: AnnotationContent,
    pub style: Arc<Style>,
    pub lod: Option<LodRange>,
    pub scale: Option<Vector3<f64>>,
}

impl AnnotationRequest {
    pub fn place(point: GeodeticPoint, text: impl Into<String>, style: Arc<Style>) -> Self {
        Self::new(point, AnnotationContent::Place { text: text.into() }, style)
    }

    pub fn label(point: GeodeticPoint, text: impl Into<String>, style: Arc<Style>) -> Self {
        Self::new(point, AnnotationContent::Label { text: text.into() }, style)
    }

    pub fn model(point: GeodeticPoint, style: Arc<Style>) -> Self {
        Self::new(point, AnnotationContent::Model { url: None }, style)
    }

    fn new(point: GeodeticPoint, content: AnnotationContent, style: Arc<Style>) -> Self {
        Self {
            point,
            content,
            style,
            lod: None,
            scale: None,
        }
    }

    pub fn with_lod(mut self, range: LodRange) -> Self {
        self.lod = Some(range);
        self
    }

    pub fn with_scale(mut self, scale: Vector3<f64>) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// A place icon, possibly a stand-in marker.
#[derive(Debug, Clone, PartialEq)]
pub struct IconImage {
    /// `None` for the placeholder marker
    pub path: Option<PathBuf>,
    pub width: f64,
    pub height: f64,
}

impl IconImage {
    pub fn is_placeholder(&self) -> bool {
        self.path.is_none()
    }
}

/// Loaded content of an annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationPayload {
    Place {
        text: String,
        icon: IconImage,
        text_symbol: TextSymbol,
    },
    Label {
        text: String,
        text_symbol: TextSymbol,
    },
    Model {
        asset: ModelAsset,
        auto_scale: bool,
    },
}

impl AnnotationPayload {
    pub fn kind(&self) -> SymbolKind {
        match self {
            AnnotationPayload::Place { .. } => SymbolKind::Icon,
            AnnotationPayload::Label { .. } => SymbolKind::Text,
            AnnotationPayload::Model { .. } => SymbolKind::Model,
        }
    }

    /// Screen box around a projected anchor; `None` for 3-D content.
    ///
    /// A place centres its icon on the anchor and puts the text to the
    /// right of it, shifted by the text's `pixel_offset`. The text
    /// alignment of a place is always left-centre.
    pub fn screen_extent(&self, anchor: &ScreenPoint, label_gap: f64) -> Option<Rect<f64>> {
        match self {
            AnnotationPayload::Label { text, text_symbol } => {
                let (w, h) = text_symbol.measure(text);
                let (ax, ay) = text_symbol.alignment.box_offset(w, h);
                let [ox, oy] = text_symbol.pixel_offset;
                let (dx, dy) = (ax + ox, ay + oy);
                Some(Rect::new(
                    coord! { x: anchor.x + dx, y: anchor.y + dy },
                    coord! { x: anchor.x + dx + w, y: anchor.y + dy + h },
                ))
            }
            AnnotationPayload::Place { text, icon, text_symbol } => {
                let (tw, th) = text_symbol.measure(text);
                let (_, dy) = TextAlignment::LeftCenter.box_offset(tw, th);
                let [ox, oy] = text_symbol.pixel_offset;
                let text_min_x = anchor.x + icon.width / 2.0 + label_gap + ox;
                let text_min_y = anchor.y + dy + oy;

                let (half_w, half_h) = (icon.width / 2.0, icon.height / 2.0);
                Some(Rect::new(
                    coord! { x: (anchor.x - half_w).min(text_min_x), y: (anchor.y - half_h).min(text_min_y) },
                    coord! { x: (anchor.x + half_w).max(text_min_x + tw), y: (anchor.y + half_h).max(text_min_y + th) },
                ))
            }
            AnnotationPayload::Model { .. } => None,
        }
    }
}

/// An annotation attached to the scene.
#[derive(Debug, Clone)]
pub struct AnnotationNode {
    pub id: AnnotationId,

    /// Insertion order
    pub sequence: u64,

    pub point: GeodeticPoint,

    pub style: Arc<Style>,

    pub payload: AnnotationPayload,

    pub placement: Placement,

    pub scale: Option<Vector3<f64>>,

    /// Gate switching this node, if any
    pub gate: Option<u64>,

    /// Takes part in decluttering
    pub declutter: bool,
}

// ============================================================================
// RESULTS
// ============================================================================

/// One request that failed to compose.
#[derive(Debug)]
pub struct CompositionFailure {
    /// Position of the request in its batch
    pub index: usize,
    pub error: ComposeError,
}

/// Outcome of composing a batch.
#[derive(Debug, Default)]
pub struct CompositionReport {
    pub added: Vec<AnnotationId>,
    pub failures: Vec<CompositionFailure>,

    /// Added with a degraded placement
    pub degraded: usize,
}

impl CompositionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An annotation drawn this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleAnnotation {
    pub id: AnnotationId,
    pub screen: ScreenPoint,

    /// Screen box of 2-D content
    pub bounds: Option<Rect<f64>>,

    /// Per-frame scale factor for auto-scaled models
    pub auto_scale: Option<f64>,
}

/// The visibility set of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameVisibility {
    /// In insertion order
    pub visible: Vec<VisibleAnnotation>,
    pub hidden_by_lod: Vec<AnnotationId>,
    pub culled: Vec<AnnotationId>,
    pub decluttered: Vec<AnnotationId>,
    pub metrics: FrameMetrics,
}

impl FrameVisibility {
    pub fn is_visible(&self, id: AnnotationId) -> bool {
        self.visible.iter().any(|v| v.id == id)
    }

    pub fn get(&self, id: AnnotationId) -> Option<&VisibleAnnotation> {
        self.visible.iter().find(|v| v.id == id)
    }

    pub fn visible_ids(&self) -> impl Iterator<Item = &AnnotationId> {
        self.visible.iter().map(|v| &v.id)
    }
}

// ============================================================================
// COMPOSER
// ============================================================================

/// Owns the annotation group of one map.
pub struct SceneComposer {
    map: MapContext,
    resolver: PlacementResolver,
    assets: Arc<dyn AssetLoader>,
    config: ComposerConfig,

    /// In insertion order
    nodes: Vec<AnnotationNode>,
    /// Position of each node in `nodes`
    index: HashMap<AnnotationId, usize>,
    gates: BTreeMap<u64, LodGate>,
    next_sequence: u64,
    next_gate: u64,
}

impl SceneComposer {
    /// Creates an empty group on `map`, reprojecting with [`StandardReprojector`].
    pub fn new(map: MapContext, assets: Arc<dyn AssetLoader>, config: ComposerConfig) -> Self {
        Self::with_reprojector(map, assets, config, Arc::new(StandardReprojector))
    }

    pub fn with_reprojector(
        map: MapContext,
        assets: Arc<dyn AssetLoader>,
        config: ComposerConfig,
        reprojector: Arc<dyn Reprojector>,
    ) -> Self {
        let resolver = PlacementResolver::new(&map.srs, reprojector, map.elevation.clone());
        Self {
            map,
            resolver,
            assets,
            config,
            nodes: Vec::new(),
            index: HashMap::new(),
            gates: BTreeMap::new(),
            next_sequence: 0,
            next_gate: 0,
        }
    }

    pub fn map(&self) -> &MapContext {
        &self.map
    }

    pub fn resolver(&self) -> &PlacementResolver {
        &self.resolver
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Adds one annotation, gated by its LOD range if it has one.
    pub fn add(&mut self, request: AnnotationRequest) -> Result<AnnotationId, ComposeError> {
        let mut node = self.build_node(&request)?;
        if let Some(range) = request.lod {
            let gate_id = self.next_gate;
            self.next_gate += 1;
            let mut gate = LodGate::new(node.placement.anchor());
            gate.add_child(node.id, range);
            self.gates.insert(gate_id, gate);
            node.gate = Some(gate_id);
        }

        let id = node.id;
        debug!("Added annotation {} ({:?})", id, node.payload.kind());
        self.push_node(node);
        Ok(id)
    }

    /// Adds several annotations under one shared gate.
    ///
    /// The gate is centred on the mean anchor of the children that
    /// composed; requests without a range are visible at every distance.
    pub fn add_lod_gate(&mut self, requests: Vec<AnnotationRequest>) -> CompositionReport {
        let mut report = CompositionReport::default();
        let gate_id = self.next_gate;
        let mut gate = LodGate::new(Point3::origin());
        let mut built = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            match self.build_node(request) {
                Ok(mut node) => {
                    gate.add_child(node.id, request.lod.unwrap_or_else(LodRange::unbounded));
                    node.gate = Some(gate_id);
                    built.push(node);
                }
                Err(error) => {
                    warn!("Omitting gated annotation #{}: {}", index, error);
                    report.failures.push(CompositionFailure { index, error });
                }
            }
        }

        if !built.is_empty() {
            self.next_gate += 1;
            gate.set_center(mean_anchor(built.iter()));
            self.gates.insert(gate_id, gate);
            for node in built {
                report.added.push(node.id);
                if node.placement.is_degraded() {
                    report.degraded += 1;
                }
                self.push_node(node);
            }
        }
        report
    }

    /// Adds a batch; each request succeeds or fails on its own.
    pub fn compose(&mut self, requests: Vec<AnnotationRequest>) -> CompositionReport {
        let mut report = CompositionReport::default();
        for (index, request) in requests.into_iter().enumerate() {
            match self.add(request) {
                Ok(id) => {
                    if self.get(id).is_some_and(|n| n.placement.is_degraded()) {
                        report.degraded += 1;
                    }
                    report.added.push(id);
                }
                Err(error) => {
                    warn!("Omitting annotation #{}: {}", index, error);
                    report.failures.push(CompositionFailure { index, error });
                }
            }
        }

        info!(
            "Composed {} annotations on map '{}' ({} failed, {} degraded)",
            report.added.len(),
            self.map.name,
            report.failures.len(),
            report.degraded
        );
        report
    }

    /// Detaches an annotation; returns true if it was present.
    pub fn remove(&mut self, id: AnnotationId) -> bool {
        let Some(&pos) = self.index.get(&id) else {
            return false;
        };
        let node = self.nodes.remove(pos);
        self.index.remove(&id);
        for (i, later) in self.nodes.iter().enumerate().skip(pos) {
            self.index.insert(later.id, i);
        }
        if let Some(gate_id) = node.gate {
            let now_empty = self.gates.get_mut(&gate_id).is_some_and(|gate| {
                gate.remove_child(id);
                gate.is_empty()
            });
            if now_empty {
                self.gates.remove(&gate_id);
            } else {
                self.recenter_gate(gate_id);
            }
        }
        true
    }

    /// Detaches everything. Ids are never reused.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.gates.clear();
    }

    /// Annotations in insertion order.
    pub fn annotations(&self) -> &[AnnotationNode] {
        &self.nodes
    }

    pub fn get(&self, id: AnnotationId) -> Option<&AnnotationNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Re-resolves degraded placements whose terrain has arrived.
    ///
    /// Returns how many changed.
    pub fn refresh_degraded(&mut self) -> usize {
        let mut touched_gates = Vec::new();
        let mut refreshed = 0;

        for node in self.nodes.iter_mut().filter(|n| n.placement.is_degraded()) {
            match self.resolver.refresh(&node.point, node.scale, &mut node.placement) {
                Ok(true) => {
                    info!(
                        "Re-resolved annotation {} at height {:.1} m",
                        node.id, node.placement.height
                    );
                    refreshed += 1;
                    touched_gates.extend(node.gate);
                }
                Ok(false) => {}
                Err(e) => warn!("Re-resolving annotation {} failed: {}", node.id, e),
            }
        }

        for gate_id in touched_gates {
            self.recenter_gate(gate_id);
        }
        refreshed
    }

    /// Computes the visibility set for one frame.
    pub fn evaluate_frame(&mut self, camera: &Camera, engine: &mut DeclutterEngine) -> FrameVisibility {
        let refreshed = self.refresh_degraded();
        let eye = camera.eye();

        let hidden: HashSet<AnnotationId> = self
            .gates
            .values()
            .flat_map(|gate| gate.evaluate_from(&eye))
            .filter(|(_, state)| *state == LodState::Hidden)
            .map(|(id, _)| id)
            .collect();

        let mut frame = FrameVisibility::default();
        let mut pending: Vec<(u64, VisibleAnnotation)> = Vec::new();
        let mut candidates = Vec::new();

        for node in &self.nodes {
            if hidden.contains(&node.id) {
                frame.hidden_by_lod.push(node.id);
                continue;
            }

            let anchor = node.placement.anchor();
            let screen = match camera.project(&anchor) {
                Some(p) if camera.in_view(&p) && !camera.is_behind_horizon(self.resolver.ellipsoid(), &anchor) => p,
                _ => {
                    frame.culled.push(node.id);
                    continue;
                }
            };

            let distance = camera.distance_to(&anchor);
            let bounds = node.payload.screen_extent(&screen, self.config.place_label_gap_px);
            let auto_scale = match node.payload {
                AnnotationPayload::Model { auto_scale: true, .. } => Some(camera.pixel_size_at(distance)),
                _ => None,
            };

            if let (true, Some(rect)) = (node.declutter, bounds) {
                candidates.push(DeclutterCandidate {
                    id: node.id,
                    bounds: rect,
                    priority: distance,
                    sequence: node.sequence,
                });
            }
            pending.push((
                node.sequence,
                VisibleAnnotation {
                    id: node.id,
                    screen,
                    bounds,
                    auto_scale,
                },
            ));
        }

        let decluttered = engine.declutter(&candidates);
        let suppressed: HashSet<AnnotationId> = decluttered.suppressed.iter().copied().collect();
        frame.decluttered = decluttered.suppressed;
        frame.visible = pending
            .into_iter()
            .filter(|(_, v)| !suppressed.contains(&v.id))
            .map(|(_, v)| v)
            .collect();

        frame.metrics = FrameMetrics {
            total: self.nodes.len(),
            visible: frame.visible.len(),
            hidden_by_lod: frame.hidden_by_lod.len(),
            culled: frame.culled.len(),
            decluttered: frame.decluttered.len(),
            candidates: candidates.len(),
            degraded: self.nodes.iter().filter(|n| n.placement.is_degraded()).count(),
            refreshed,
        };
        debug!("Frame: {:?}", frame.metrics);
        frame
    }

    fn build_node(&mut self, request: &AnnotationRequest) -> Result<AnnotationNode, ComposeError> {
        let placement = self.resolver.resolve(&request.point, request.scale)?;
        let payload = self.load_payload(&request.content, &request.style)?;
        let declutter = request.style.declutter_enabled() && payload.kind() != SymbolKind::Model;

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        Ok(AnnotationNode {
            id: AnnotationId::from_seed(sequence),
            sequence,
            point: request.point.clone(),
            style: request.style.clone(),
            payload,
            placement,
            scale: request.scale,
            gate: None,
            declutter,
        })
    }

    fn load_payload(&self, content: &AnnotationContent, style: &Style) -> Result<AnnotationPayload, ComposeError> {
        let text_symbol = style.text.clone().unwrap_or_default();
        match content {
            AnnotationContent::Label { text } => Ok(AnnotationPayload::Label {
                text: text.clone(),
                text_symbol,
            }),
            AnnotationContent::Place { text } => Ok(AnnotationPayload::Place {
                text: text.clone(),
                icon: self.load_icon(style),
                text_symbol,
            }),
            AnnotationContent::Model { url } => {
                let symbol = style.model.as_ref().ok_or(ComposeError::MissingSymbol(SymbolKind::Model))?;
                let path = url
                    .as_ref()
                    .or(symbol.url.as_ref())
                    .ok_or(ComposeError::MissingSymbol(SymbolKind::Model))?;
                let asset = self.assets.load_model(path)?;
                Ok(AnnotationPayload::Model {
                    asset,
                    auto_scale: symbol.auto_scale,
                })
            }
        }
    }

    /// The style's icon, or a placeholder marker if it cannot be loaded.
    fn load_icon(&self, style: &Style) -> IconImage {
        let scale = style.icon.as_ref().map_or(1.0, |icon| icon.scale);
        let (pw, ph) = self.config.placeholder_icon_size;
        let placeholder = IconImage {
            path: None,
            width: pw as f64 * scale,
            height: ph as f64 * scale,
        };

        let Some(url) = style.icon.as_ref().and_then(|icon| icon.url.as_ref()) else {
            return placeholder;
        };
        match self.assets.load_image(url) {
            Ok(image) => IconImage {
                path: Some(image.path),
                width: image.width as f64 * scale,
                height: image.height as f64 * scale,
            },
            Err(e) => {
                warn!("Icon unavailable, using placeholder: {}", e);
                placeholder
            }
        }
    }

    fn push_node(&mut self, node: AnnotationNode) {
        self.index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    fn recenter_gate(&mut self, gate_id: u64) {
        let center = mean_anchor(self.nodes.iter().filter(|n| n.gate == Some(gate_id)));
        if let Some(gate) = self.gates.get_mut(&gate_id) {
            gate.set_center(center);
        }
    }
}

fn mean_anchor<'a>(nodes: impl Iterator<Item = &'a AnnotationNode>) -> Point3<f64> {
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for node in nodes {
        sum += node.placement.anchor().coords;
        count += 1;
    }
    if count == 0 {
        Point3::origin()
    } else {
        Point3::from(sum / count as f64)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors that can occur while composing a scene.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Placement failed: {0}")]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Asset(#[from] EnvError),

    #[error("Style has no {0:?} symbol")]
    MissingSymbol(SymbolKind),

    #[error(transparent)]
    Lod(#[from] LodError),

    #[error("Unknown style: {0}")]
    UnknownStyle(String),

    #[error("No map found: {0}")]
    MapNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoplace_declutter::DeclutterConfig;
    use crate::geoplace_srs::AltitudeMode;
    use crate::geoplace_style::{Color, TextEncoding};
    use geoplace_env::{ElevationTile, FlatElevation, MemoryAssetLoader, TileElevation, TileKey};

    const PLACEMARK: &str = "../data/placemark32.png";
    const COW: &str = "../data/cow.osgt";

    fn assets() -> Arc<dyn AssetLoader> {
        Arc::new(
            MemoryAssetLoader::new()
                .with_image(PLACEMARK, 32, 32)
                .with_model(COW, 1.0),
        )
    }

    fn composer_with(elevation: Arc<dyn ElevationSource>) -> SceneComposer {
        let map = MapContext::new("globe", SpatialReference::wgs84(), elevation);
        SceneComposer::new(map, assets(), ComposerConfig::default())
    }

    fn composer() -> SceneComposer {
        composer_with(Arc::new(FlatElevation(0.0)))
    }

    fn place_style() -> Arc<Style> {
        let mut style = Style::new();
        style.icon_mut().url = Some(PathBuf::from(PLACEMARK));
        style.icon_mut().declutter = true;
        let text = style.text_mut();
        text.halo = Some(Color::from_rgba8(0x5f, 0x5f, 0x5f, 0xff));
        text.encoding = TextEncoding::Utf8;
        text.font = Some("simhei.ttf".into());
        style.into_shared()
    }

    fn label_style() -> Arc<Style> {
        let mut style = Style::new();
        style.text_mut().fill = Color::YELLOW;
        style.text_mut().alignment = TextAlignment::CenterCenter;
        style.into_shared()
    }

    fn point(c: &SceneComposer, lat: f64, lon: f64, z: f64, mode: AltitudeMode) -> GeodeticPoint {
        GeodeticPoint::new(c.resolver().map_srs().clone(), lon, lat, z, mode).unwrap()
    }

    fn ground(c: &SceneComposer, lat: f64, lon: f64) -> GeodeticPoint {
        point(c, lat, lon, 0.0, AltitudeMode::RelativeToGround)
    }

    fn camera_over(c: &SceneComposer, lat: f64, lon: f64, range: f64) -> Camera {
        Camera::look_at_geodetic(c.resolver().ellipsoid(), lat, lon, range, 1024, 768).unwrap()
    }

    #[test]
    fn test_new_york_and_chicago_both_visible() {
        let mut c = composer();
        let ny = c.add(AnnotationRequest::place(ground(&c, 40.71, -74.00), "New York", place_style())).unwrap();
        let chicago = c
            .add(AnnotationRequest::place(
                point(&c, 41.90, -87.65, 1000.0, AltitudeMode::Absolute),
                "Chicago",
                place_style(),
            ))
            .unwrap();

        let camera = camera_over(&c, 41.0, -81.0, 5_000_000.0);
        let frame = c.evaluate_frame(&camera, &mut DeclutterEngine::default());

        assert!(frame.is_visible(ny));
        assert!(frame.is_visible(chicago));
        assert!(frame.decluttered.is_empty());
        assert_eq!(frame.metrics.candidates, 2);
    }

    #[test]
    fn test_overlapping_labels_leave_one_survivor() {
        let mut c = composer();
        let first = c.add(AnnotationRequest::place(ground(&c, 40.71, -74.00), "Label A", place_style())).unwrap();
        let second = c.add(AnnotationRequest::place(ground(&c, 40.71, -74.00), "Label B", place_style())).unwrap();

        let camera = camera_over(&c, 40.71, -74.00, 1_000_000.0);
        let mut engine = DeclutterEngine::default();
        for _ in 0..5 {
            let frame = c.evaluate_frame(&camera, &mut engine);
            assert!(frame.is_visible(first));
            assert_eq!(frame.decluttered, vec![second]);
        }
    }

    #[test]
    fn test_labels_without_declutter_always_show() {
        let mut c = composer();
        let mut style = Style::new();
        style.text_mut().declutter = false;
        let style = style.into_shared();

        let a = c.add(AnnotationRequest::label(ground(&c, 0.0, 0.0), "A", style.clone())).unwrap();
        let b = c.add(AnnotationRequest::label(ground(&c, 0.0, 0.0), "B", style)).unwrap();

        let frame = c.evaluate_frame(&camera_over(&c, 0.0, 0.0, 1e6), &mut DeclutterEngine::default());
        assert!(frame.is_visible(a) && frame.is_visible(b));
        assert_eq!(frame.metrics.candidates, 0);
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut c = composer();
        let mut missing_model = Style::new();
        missing_model.model_mut().url = Some(PathBuf::from("../data/missing.osg"));

        let report = c.compose(vec![
            AnnotationRequest::label(ground(&c, 50.0, 14.68), "Prague", label_style()),
            AnnotationRequest::model(ground(&c, 40.0, 116.0), missing_model.into_shared()),
            AnnotationRequest::model(ground(&c, 40.0, 116.0), label_style()),
            AnnotationRequest::label(ground(&c, 41.90, -87.65), "Chicago", label_style())
                .with_scale(Vector3::new(0.0, 1.0, 1.0)),
            AnnotationRequest::label(ground(&c, 40.71, -74.00), "New York", label_style()),
        ]);

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.failures.len(), 3);
        assert!(matches!(report.failures[0].error, ComposeError::Asset(EnvError::AssetNotFound(_))));
        assert!(matches!(report.failures[1].error, ComposeError::MissingSymbol(SymbolKind::Model)));
        assert!(matches!(report.failures[2].error, ComposeError::Placement(PlacementError::InvalidScale(_))));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_missing_icon_uses_placeholder() {
        let mut c = composer();
        let mut style = Style::new();
        style.icon_mut().url = Some(PathBuf::from("../data/nope.png"));
        let id = c.add(AnnotationRequest::place(ground(&c, 10.0, 10.0), "X", style.into_shared())).unwrap();

        match &c.get(id).unwrap().payload {
            AnnotationPayload::Place { icon, .. } => {
                assert!(icon.is_placeholder());
                assert_eq!(icon.width, 16.0);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_place_text_follows_pixel_offset() {
        let mut text_symbol = TextSymbol::default();
        let icon = IconImage {
            path: None,
            width: 16.0,
            height: 16.0,
        };
        let anchor = ScreenPoint {
            x: 100.0,
            y: 100.0,
            depth: 1.0,
        };
        let place = |text_symbol: TextSymbol| AnnotationPayload::Place {
            text: "Prague".into(),
            icon: icon.clone(),
            text_symbol,
        };

        // Text is taller than the icon and centred on the anchor
        let plain = place(text_symbol.clone()).screen_extent(&anchor, 2.0).unwrap();
        assert_eq!(plain.min().x, 92.0);
        assert!((plain.min().y - 90.4).abs() < 1e-9);

        // Shifted down past the icon, the box grows below it
        text_symbol.pixel_offset = [5.0, 40.0];
        let shifted = place(text_symbol).screen_extent(&anchor, 2.0).unwrap();
        assert_eq!(shifted.min().x, 92.0);
        assert_eq!(shifted.min().y, 92.0);
        assert!((shifted.max().x - (plain.max().x + 5.0)).abs() < 1e-9);
        assert!((shifted.max().y - (plain.max().y + 40.0)).abs() < 1e-9);
    }

    #[test]
    fn test_lookup_survives_removal() {
        let mut c = composer();
        let ids: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| c.add(AnnotationRequest::label(ground(&c, 0.0, 0.0), *t, label_style())).unwrap())
            .collect();

        assert!(c.remove(ids[1]));
        assert!(!c.remove(ids[1]));
        assert!(c.get(ids[1]).is_none());
        for &id in [ids[0], ids[2], ids[3]].iter() {
            assert_eq!(c.get(id).unwrap().id, id);
        }
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_frame_cost_stays_near_linear() {
        fn frame_time(n: usize) -> std::time::Duration {
            let mut c = composer();
            let requests = (0..n)
                .map(|i| AnnotationRequest::label(ground(&c, 40.71, -74.00), format!("L{}", i), label_style()))
                .collect();
            assert_eq!(c.compose(requests).added.len(), n);
            let camera = camera_over(&c, 40.71, -74.00, 1e6);

            (0..3)
                .map(|_| {
                    let mut engine = DeclutterEngine::new(DeclutterConfig {
                        max_candidates: usize::MAX,
                        ..Default::default()
                    });
                    let start = std::time::Instant::now();
                    let frame = c.evaluate_frame(&camera, &mut engine);
                    let elapsed = start.elapsed();
                    assert_eq!(frame.visible.len(), 1);
                    assert_eq!(frame.decluttered.len(), n - 1);
                    elapsed
                })
                .min()
                .unwrap_or_default()
        }

        let small = frame_time(1_000).as_secs_f64().max(1e-6);
        let large = frame_time(8_000).as_secs_f64();
        // 8x the labels: ~8-10x the time when linearithmic, ~64x when quadratic
        assert!(large / small < 32.0, "8x labels took {:.1}x as long", large / small);
    }

    #[test]
    fn test_lod_gate_switches_prague() {
        let mut c = composer();
        let prague = c
            .add(
                AnnotationRequest::label(ground(&c, 50.0, 14.68), "Prague", label_style())
                    .with_lod(LodRange::new(0.0, 2e6).unwrap()),
            )
            .unwrap();
        assert_eq!(c.gate_count(), 1);

        let mut engine = DeclutterEngine::default();
        let far = c.evaluate_frame(&camera_over(&c, 50.0, 14.68, 1e7), &mut engine);
        assert_eq!(far.hidden_by_lod, vec![prague]);

        let near = c.evaluate_frame(&camera_over(&c, 50.0, 14.68, 1e6), &mut engine);
        assert!(near.is_visible(prague));
    }

    #[test]
    fn test_shared_gate_and_removal() {
        let mut c = composer();
        let report = c.add_lod_gate(vec![
            AnnotationRequest::label(ground(&c, 50.0, 14.0), "near", label_style())
                .with_lod(LodRange::new(0.0, 3e6).unwrap()),
            AnnotationRequest::label(ground(&c, 50.0, 15.0), "far", label_style())
                .with_lod(LodRange::new(3e6, f64::INFINITY).unwrap()),
        ]);
        assert!(report.is_complete());
        let (near, far) = (report.added[0], report.added[1]);

        let frame = c.evaluate_frame(&camera_over(&c, 50.0, 14.5, 1e6), &mut DeclutterEngine::default());
        assert!(frame.is_visible(near));
        assert_eq!(frame.hidden_by_lod, vec![far]);

        assert!(c.remove(near));
        assert_eq!(c.gate_count(), 1);
        assert!(c.remove(far));
        assert_eq!(c.gate_count(), 0);
        assert!(!c.remove(far));
    }

    #[test]
    fn test_far_side_annotations_are_culled() {
        let mut c = composer();
        let ny = c.add(AnnotationRequest::label(ground(&c, 40.71, -74.00), "New York", label_style())).unwrap();
        let beijing = c.add(AnnotationRequest::label(ground(&c, 39.90556, 116.42472), "北京", label_style())).unwrap();

        let frame = c.evaluate_frame(&camera_over(&c, 40.0, 116.0, 5e6), &mut DeclutterEngine::default());
        assert_eq!(frame.culled, vec![ny]);
        assert!(frame.is_visible(beijing));
    }

    #[test]
    fn test_model_auto_scale() {
        let mut c = composer();
        let mut fixed = Style::new();
        fixed.model_mut().url = Some(PathBuf::from(COW));
        let mut scaled = fixed.clone();
        scaled.model_mut().auto_scale = true;

        let a = c.add(AnnotationRequest::model(ground(&c, 40.0, 116.0), fixed.into_shared())).unwrap();
        let b = c.add(AnnotationRequest::model(ground(&c, 40.0, 116.0), scaled.into_shared())).unwrap();

        let camera = camera_over(&c, 40.0, 116.0, 1e6);
        let frame = c.evaluate_frame(&camera, &mut DeclutterEngine::default());
        assert_eq!(frame.get(a).unwrap().auto_scale, None);
        let factor = frame.get(b).unwrap().auto_scale.unwrap();
        assert!((factor - camera.pixel_size_at(1e6)).abs() < 1e-3);
        assert!(frame.get(a).unwrap().bounds.is_none());
    }

    #[test]
    fn test_degraded_placement_is_re_resolved_on_a_later_frame() {
        let terrain = Arc::new(TileElevation::new(1.0).unwrap());
        let mut c = composer_with(terrain.clone());
        let ny = c.add(AnnotationRequest::place(ground(&c, 40.71, -74.00), "New York", place_style())).unwrap();
        assert!(c.get(ny).unwrap().placement.is_degraded());

        let camera = camera_over(&c, 40.71, -74.00, 1e6);
        let mut engine = DeclutterEngine::default();
        let frame = c.evaluate_frame(&camera, &mut engine);
        assert!(frame.is_visible(ny));
        assert_eq!(frame.metrics.degraded, 1);

        let key = TileKey::containing(40.71, -74.00, 1.0);
        terrain.insert_tile(ElevationTile::from_fn(key, 1.0, 2, |_, _| 35.0).unwrap());

        let frame = c.evaluate_frame(&camera, &mut engine);
        assert_eq!(frame.metrics.refreshed, 1);
        assert_eq!(frame.metrics.degraded, 0);
        let node = c.get(ny).unwrap();
        assert!(!node.placement.is_degraded());
        assert!((node.placement.height - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear_never_reuses_ids() {
        let mut c = composer();
        let first = c.add(AnnotationRequest::label(ground(&c, 0.0, 0.0), "a", label_style())).unwrap();
        c.clear();
        assert!(c.is_empty());
        let second = c.add(AnnotationRequest::label(ground(&c, 0.0, 0.0), "b", label_style())).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_static_map_loader() {
        let loader = StaticMapLoader::new().with_map(MapContext::new(
            "globe",
            SpatialReference::wgs84(),
            Arc::new(FlatElevation(0.0)),
        ));
        assert_eq!(loader.names(), vec!["globe"]);
        assert!(loader.load("globe").is_ok());
        assert!(matches!(loader.load("mars"), Err(ComposeError::MapNotFound(_))));
    }
}
