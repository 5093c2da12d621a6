//! Common types for the geoplace environment abstraction.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an annotation node.
///
/// Derived deterministically from an insertion sequence so the same scene
/// always yields the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub Uuid);

impl AnnotationId {
    /// Creates a deterministic AnnotationId from a seed (e.g. insertion sequence).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Result of a terrain elevation query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ElevationSample {
    /// Terrain height above the ellipsoid, in meters
    Height(f64),

    /// No elevation data (yet) for this location
    Unavailable,
}

impl ElevationSample {
    /// Returns the height if available.
    pub fn height(&self) -> Option<f64> {
        match self {
            ElevationSample::Height(h) => Some(*h),
            ElevationSample::Unavailable => None,
        }
    }

    /// Returns true if elevation data was available.
    pub fn is_available(&self) -> bool {
        matches!(self, ElevationSample::Height(_))
    }
}

/// Key of a square geographic elevation tile.
///
/// Tile `(row, col)` covers latitudes `[-90 + row*size, -90 + (row+1)*size)`
/// and longitudes `[-180 + col*size, -180 + (col+1)*size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub row: i32,
    pub col: i32,
}

impl TileKey {
    /// Checks that `tile_size_deg` can partition the globe into tiles.
    pub fn validate_size(tile_size_deg: f64) -> Result<f64, EnvError> {
        if tile_size_deg.is_finite() && tile_size_deg > 0.0 {
            Ok(tile_size_deg)
        } else {
            Err(EnvError::InvalidTileSize(tile_size_deg))
        }
    }

    /// Returns the key of the tile containing (lat, lon) for a tile size in degrees.
    ///
    /// Sizes rejected by [`TileKey::validate_size`] collapse to tile (0, 0).
    pub fn containing(lat_deg: f64, lon_deg: f64, tile_size_deg: f64) -> Self {
        if Self::validate_size(tile_size_deg).is_err() {
            return Self { row: 0, col: 0 };
        }
        let row = ((lat_deg + 90.0) / tile_size_deg).floor() as i32;
        let col = ((lon_deg + 180.0) / tile_size_deg).floor() as i32;
        // The north pole and the antimeridian belong to the last row/column.
        let max_row = ((180.0 / tile_size_deg).ceil() as i32 - 1).max(0);
        let max_col = ((360.0 / tile_size_deg).ceil() as i32 - 1).max(0);
        Self {
            row: row.clamp(0, max_row),
            col: col.clamp(0, max_col),
        }
    }

    /// South-west corner of the tile as (lat, lon) degrees.
    pub fn origin(&self, tile_size_deg: f64) -> (f64, f64) {
        (
            -90.0 + self.row as f64 * tile_size_deg,
            -180.0 + self.col as f64 * tile_size_deg,
        )
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile({},{})", self.row, self.col)
    }
}
