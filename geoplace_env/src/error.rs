//! Error types for the geoplace environment abstraction.

use std::path::Path;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Asset path could not be resolved to a model or image
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// Tile size that cannot partition the globe
    #[error("Tile size must be positive and finite, got {0}")]
    InvalidTileSize(f64),

    /// Background elevation tile fetch failed
    #[error("Elevation tile fetch failed: {0}")]
    TileFetch(String),

    /// Underlying filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// Creates an asset-not-found error for a path.
    pub fn asset_not_found(path: impl AsRef<Path>) -> Self {
        Self::AssetNotFound(path.as_ref().display().to_string())
    }

    /// Creates a tile fetch error.
    pub fn tile_fetch(msg: impl Into<String>) -> Self {
        Self::TileFetch(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_not_found_message() {
        let err = EnvError::asset_not_found("../data/cow.osgt");
        assert_eq!(err.to_string(), "Asset not found: ../data/cow.osgt");
    }

    #[test]
    fn test_io_error_converts() {
        let err: EnvError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, EnvError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: denied");
    }
}
