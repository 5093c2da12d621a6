//! Asset loading contracts.
//!
//! Model and image decoding are someone else's job; the kernel only needs
//! an opaque handle plus the few numbers it places and declutters with.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Opaque renderable subtree returned by the model loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAsset {
    /// Path the model was loaded from
    pub path: PathBuf,

    /// Bounding sphere radius in model units
    pub bounding_radius: f64,
}

/// Icon image handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Path the image was loaded from
    pub path: PathBuf,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,
}

/// Loads models and icon images by path.
pub trait AssetLoader: Send + Sync {
    /// Loads a model, or fails with [`EnvError::AssetNotFound`].
    fn load_model(&self, path: &Path) -> Result<ModelAsset, EnvError>;

    /// Loads an icon image, or fails with [`EnvError::AssetNotFound`].
    fn load_image(&self, path: &Path) -> Result<ImageAsset, EnvError>;
}

/// Asset registry held in memory (simulation and tests).
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetLoader {
    models: HashMap<PathBuf, ModelAsset>,
    images: HashMap<PathBuf, ImageAsset>,
}

impl MemoryAssetLoader {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model.
    pub fn with_model(mut self, path: impl Into<PathBuf>, bounding_radius: f64) -> Self {
        let path = path.into();
        self.models.insert(path.clone(), ModelAsset { path, bounding_radius });
        self
    }

    /// Registers an image.
    pub fn with_image(mut self, path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        let path = path.into();
        self.images.insert(path.clone(), ImageAsset { path, width, height });
        self
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn load_model(&self, path: &Path) -> Result<ModelAsset, EnvError> {
        self.models
            .get(path)
            .cloned()
            .ok_or_else(|| EnvError::asset_not_found(path))
    }

    fn load_image(&self, path: &Path) -> Result<ImageAsset, EnvError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| EnvError::asset_not_found(path))
    }
}

/// Loader that resolves paths against a directory on disk.
///
/// Files are only checked for existence; images report a nominal size
/// and models a nominal bounding radius.
#[derive(Debug, Clone)]
pub struct FsAssetLoader {
    root: PathBuf,
    icon_size: (u32, u32),
    model_radius: f64,
}

impl FsAssetLoader {
    /// Creates a loader rooted at `root` with 32x32 icons and unit-radius models.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            icon_size: (32, 32),
            model_radius: 1.0,
        }
    }

    /// Overrides the nominal icon size.
    pub fn with_icon_size(mut self, width: u32, height: u32) -> Self {
        self.icon_size = (width, height);
        self
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, EnvError> {
        let full = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
        match std::fs::metadata(&full) {
            Ok(meta) if meta.is_file() => Ok(full),
            Ok(_) => Err(EnvError::asset_not_found(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EnvError::asset_not_found(path)),
            Err(e) => Err(EnvError::Io(e)),
        }
    }
}

impl AssetLoader for FsAssetLoader {
    fn load_model(&self, path: &Path) -> Result<ModelAsset, EnvError> {
        let path = self.resolve(path)?;
        Ok(ModelAsset { path, bounding_radius: self.model_radius })
    }

    fn load_image(&self, path: &Path) -> Result<ImageAsset, EnvError> {
        let path = self.resolve(path)?;
        Ok(ImageAsset {
            path,
            width: self.icon_size.0,
            height: self.icon_size.1,
        })
    }
}
