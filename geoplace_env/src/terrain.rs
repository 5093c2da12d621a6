//! Terrain elevation contracts and in-memory implementations.

use crate::error::EnvError;
use crate::types::{ElevationSample, TileKey};
use std::collections::HashMap;
use std::sync::RwLock;

/// Terrain elevation query consumed by the placement resolver.
///
/// Implementations must never block: if the data for a location is not
/// resident they return [`ElevationSample::Unavailable`].
pub trait ElevationSource: Send + Sync {
    /// Samples terrain height (meters above the ellipsoid) at a geographic location.
    fn sample_elevation(&self, lat_deg: f64, lon_deg: f64) -> ElevationSample;
}

/// Terrain that is the same height everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatElevation(pub f64);

impl ElevationSource for FlatElevation {
    fn sample_elevation(&self, _lat_deg: f64, _lon_deg: f64) -> ElevationSample {
        ElevationSample::Height(self.0)
    }
}

/// A map without any elevation layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoElevation;

impl ElevationSource for NoElevation {
    fn sample_elevation(&self, _lat_deg: f64, _lon_deg: f64) -> ElevationSample {
        ElevationSample::Unavailable
    }
}

/// A square grid of height posts covering one [`TileKey`].
///
/// Posts are stored row-major from the south-west corner, rows running
/// north and columns running east. Edge posts are shared with neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationTile {
    key: TileKey,
    tile_size_deg: f64,
    resolution: usize,
    heights: Vec<f64>,
}

impl ElevationTile {
    /// Creates a tile from `resolution * resolution` height posts.
    pub fn new(
        key: TileKey,
        tile_size_deg: f64,
        resolution: usize,
        heights: Vec<f64>,
    ) -> Result<Self, EnvError> {
        TileKey::validate_size(tile_size_deg)?;
        if resolution < 2 {
            return Err(EnvError::tile_fetch(format!(
                "{} needs at least 2x2 posts, got {}",
                key, resolution
            )));
        }
        if heights.len() != resolution * resolution {
            return Err(EnvError::tile_fetch(format!(
                "{} expected {} posts, got {}",
                key,
                resolution * resolution,
                heights.len()
            )));
        }
        Ok(Self {
            key,
            tile_size_deg,
            resolution,
            heights,
        })
    }

    /// Builds a tile by evaluating `height(lat, lon)` at every post.
    pub fn from_fn(
        key: TileKey,
        tile_size_deg: f64,
        resolution: usize,
        height: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, EnvError> {
        let (lat0, lon0) = key.origin(tile_size_deg);
        let step = tile_size_deg / (resolution.max(2) - 1) as f64;
        let mut heights = Vec::with_capacity(resolution * resolution);
        for row in 0..resolution {
            for col in 0..resolution {
                heights.push(height(lat0 + row as f64 * step, lon0 + col as f64 * step));
            }
        }
        Self::new(key, tile_size_deg, resolution, heights)
    }

    /// The key of this tile.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Bilinearly interpolated height at (lat, lon), or `None` outside the tile.
    pub fn sample(&self, lat_deg: f64, lon_deg: f64) -> Option<f64> {
        let (lat0, lon0) = self.key.origin(self.tile_size_deg);
        let u = (lon_deg - lon0) / self.tile_size_deg;
        let v = (lat_deg - lat0) / self.tile_size_deg;
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }

        let last = (self.resolution - 1) as f64;
        let fx = u * last;
        let fy = v * last;
        let col = (fx.floor() as usize).min(self.resolution - 2);
        let row = (fy.floor() as usize).min(self.resolution - 2);
        let tx = fx - col as f64;
        let ty = fy - row as f64;

        let at = |r: usize, c: usize| self.heights[r * self.resolution + c];
        let south = at(row, col) * (1.0 - tx) + at(row, col + 1) * tx;
        let north = at(row + 1, col) * (1.0 - tx) + at(row + 1, col + 1) * tx;
        Some(south * (1.0 - ty) + north * ty)
    }
}

/// Elevation backed by resident tiles; missing tiles read as unavailable.
///
/// Tiles can be inserted at any time (e.g. from a background loader),
/// so sampling goes through a read lock.
pub struct TileElevation {
    tile_size_deg: f64,
    tiles: RwLock<HashMap<TileKey, ElevationTile>>,
}

impl TileElevation {
    /// Creates an empty tile store for tiles of the given size in degrees.
    ///
    /// Fails with [`EnvError::InvalidTileSize`] unless the size is positive and finite.
    pub fn new(tile_size_deg: f64) -> Result<Self, EnvError> {
        Ok(Self {
            tile_size_deg: TileKey::validate_size(tile_size_deg)?,
            tiles: RwLock::new(HashMap::new()),
        })
    }

    /// Tile size in degrees.
    pub fn tile_size_deg(&self) -> f64 {
        self.tile_size_deg
    }

    /// Makes a tile resident, replacing any previous tile with the same key.
    pub fn insert_tile(&self, tile: ElevationTile) {
        let mut tiles = self.tiles.write().unwrap_or_else(|e| e.into_inner());
        tiles.insert(tile.key(), tile);
    }

    /// Returns true if the tile is resident.
    pub fn has_tile(&self, key: &TileKey) -> bool {
        let tiles = self.tiles.read().unwrap_or_else(|e| e.into_inner());
        tiles.contains_key(key)
    }

    /// Number of resident tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ElevationSource for TileElevation {
    fn sample_elevation(&self, lat_deg: f64, lon_deg: f64) -> ElevationSample {
        let key = TileKey::containing(lat_deg, lon_deg, self.tile_size_deg);
        let tiles = self.tiles.read().unwrap_or_else(|e| e.into_inner());
        tiles
            .get(&key)
            .and_then(|tile| tile.sample(lat_deg, lon_deg))
            .map(ElevationSample::Height)
            .unwrap_or(ElevationSample::Unavailable)
    }
}
