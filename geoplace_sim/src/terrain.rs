//! Procedural terrain for simulation.
//!
//! Heights are a smooth, seed-dependent function of position, so any tile
//! can be regenerated bit-identically from the seed alone. The same terrain
//! is offered synchronously (every sample available) and as a slow tile
//! source for background paging.

use async_trait::async_trait;
use geoplace_env::{ElevationSample, ElevationSource, ElevationTile, ElevationTileSource, EnvError, TileKey};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::debug;

/// Height posts per tile edge
const TILE_RESOLUTION: usize = 17;

/// Rolling hills from a handful of seeded sinusoids.
#[derive(Debug, Clone, PartialEq)]
pub struct ProceduralTerrain {
    /// (amplitude m, lat frequency, lon frequency, phase)
    waves: Vec<(f64, f64, f64, f64)>,

    /// Simulated fetch latency per tile
    fetch_delay: Duration,
}

impl ProceduralTerrain {
    /// Creates terrain from a seed; tiles are served without delay.
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let waves = (0..4)
            .map(|i| {
                let amplitude = rng.gen_range(50.0..400.0) / (i + 1) as f64;
                let lat_freq = rng.gen_range(0.5..3.0) * (i + 1) as f64;
                let lon_freq = rng.gen_range(0.5..3.0) * (i + 1) as f64;
                let phase = rng.gen_range(0.0..std::f64::consts::TAU);
                (amplitude, lat_freq, lon_freq, phase)
            })
            .collect();
        Self {
            waves,
            fetch_delay: Duration::ZERO,
        }
    }

    /// Sets the simulated latency of tile fetches.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Terrain height in meters; never negative.
    pub fn height_at(&self, lat_deg: f64, lon_deg: f64) -> f64 {
        let (lat, lon) = (lat_deg.to_radians(), lon_deg.to_radians());
        let relief: f64 = self
            .waves
            .iter()
            .map(|(a, fy, fx, phase)| a * ((fy * lat + phase).sin() * (fx * lon).cos()))
            .sum();
        let ceiling: f64 = self.waves.iter().map(|w| w.0).sum();
        (relief + ceiling).max(0.0)
    }
}

impl ElevationSource for ProceduralTerrain {
    fn sample_elevation(&self, lat_deg: f64, lon_deg: f64) -> ElevationSample {
        if lat_deg.is_finite() && lon_deg.is_finite() {
            ElevationSample::Height(self.height_at(lat_deg, lon_deg))
        } else {
            ElevationSample::Unavailable
        }
    }
}

#[async_trait]
impl ElevationTileSource for ProceduralTerrain {
    async fn fetch_tile(&self, key: TileKey, tile_size_deg: f64) -> Result<ElevationTile, EnvError> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        debug!("Generated elevation {}", key);
        ElevationTile::from_fn(key, tile_size_deg, TILE_RESOLUTION, |lat, lon| self.height_at(lat, lon))
    }
}
