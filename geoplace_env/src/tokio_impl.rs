//! Background elevation paging on a Tokio runtime.

use crate::error::EnvError;
use crate::terrain::{ElevationSource, ElevationTile, TileElevation};
use crate::types::{ElevationSample, TileKey};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Asynchronous producer of elevation tiles (disk cache, tile server, generator...).
#[async_trait]
pub trait ElevationTileSource: Send + Sync + 'static {
    /// Fetches the tile for `key`.
    async fn fetch_tile(&self, key: TileKey, tile_size_deg: f64) -> Result<ElevationTile, EnvError>;
}

/// Elevation that pages tiles in on demand without ever blocking the caller.
///
/// A sample that hits a non-resident tile returns
/// [`ElevationSample::Unavailable`] and schedules the fetch on the runtime;
/// once the tile lands, later samples at that location succeed. At most one
/// fetch per tile is in flight. Failed fetches are logged and retried on the
/// next miss.
pub struct PagedElevation<S: ElevationTileSource> {
    source: Arc<S>,
    resident: Arc<TileElevation>,
    pending: Arc<Mutex<HashSet<TileKey>>>,
    handle: Handle,
}

impl<S: ElevationTileSource> PagedElevation<S> {
    /// Creates a pager fetching `tile_size_deg` tiles from `source` on `handle`.
    pub fn new(source: S, tile_size_deg: f64, handle: Handle) -> Result<Self, EnvError> {
        Ok(Self {
            source: Arc::new(source),
            resident: Arc::new(TileElevation::new(tile_size_deg)?),
            pending: Arc::new(Mutex::new(HashSet::new())),
            handle,
        })
    }

    /// The tiles paged in so far.
    pub fn resident(&self) -> &TileElevation {
        &self.resident
    }

    /// Number of fetches currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn request(&self, key: TileKey) {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if !pending.insert(key) {
                return;
            }
        }

        debug!("Paging in elevation {}", key);
        let source = Arc::clone(&self.source);
        let resident = Arc::clone(&self.resident);
        let pending = Arc::clone(&self.pending);
        let tile_size_deg = self.resident.tile_size_deg();

        self.handle.spawn(async move {
            match source.fetch_tile(key, tile_size_deg).await {
                Ok(tile) => resident.insert_tile(tile),
                Err(e) => warn!("Elevation {} unavailable: {}", key, e),
            }
            pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);
        });
    }
}

impl<S: ElevationTileSource> ElevationSource for PagedElevation<S> {
    fn sample_elevation(&self, lat_deg: f64, lon_deg: f64) -> ElevationSample {
        let sample = self.resident.sample_elevation(lat_deg, lon_deg);
        if !sample.is_available() && lat_deg.is_finite() && lon_deg.is_finite() {
            self.request(TileKey::containing(lat_deg, lon_deg, self.resident.tile_size_deg()));
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ConstantSource {
        height: f64,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ElevationTileSource for ConstantSource {
        async fn fetch_tile(&self, key: TileKey, tile_size_deg: f64) -> Result<ElevationTile, EnvError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let height = self.height;
            ElevationTile::from_fn(key, tile_size_deg, 2, move |_, _| height)
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ElevationTileSource for BrokenSource {
        async fn fetch_tile(&self, key: TileKey, _tile_size_deg: f64) -> Result<ElevationTile, EnvError> {
            Err(EnvError::tile_fetch(format!("{} offline", key)))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_paged_elevation_becomes_available() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = ConstantSource { height: 25.0, fetches: Arc::clone(&fetches) };
        let terrain = PagedElevation::new(source, 1.0, Handle::current()).unwrap();

        // First touch misses and schedules a fetch
        assert_eq!(terrain.sample_elevation(40.71, -74.0), ElevationSample::Unavailable);

        let mut sample = ElevationSample::Unavailable;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            sample = terrain.sample_elevation(40.71, -74.0);
            if sample.is_available() {
                break;
            }
        }

        let height = sample.height().expect("tile should have paged in");
        assert!((height - 25.0).abs() < 1e-9);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(terrain.resident().tile_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_paged_elevation_single_fetch_in_flight() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = ConstantSource { height: 1.0, fetches: Arc::clone(&fetches) };
        let terrain = PagedElevation::new(source, 1.0, Handle::current()).unwrap();

        // Repeated misses in the same tile before it lands
        terrain.sample_elevation(40.1, -74.9);
        terrain.sample_elevation(40.2, -74.8);
        terrain.sample_elevation(40.3, -74.7);

        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if terrain.pending_count() == 0 {
                break;
            }
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_paged_elevation_failed_fetch_stays_unavailable() {
        let terrain = PagedElevation::new(BrokenSource, 1.0, Handle::current()).unwrap();
        terrain.sample_elevation(0.5, 0.5);

        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if terrain.pending_count() == 0 {
                break;
            }
        }
        assert_eq!(terrain.sample_elevation(0.5, 0.5), ElevationSample::Unavailable);
        assert_eq!(terrain.resident().tile_count(), 0);
    }

    #[tokio::test]
    async fn test_paged_elevation_rejects_bad_tile_size() {
        let result = PagedElevation::new(BrokenSource, -1.0, Handle::current());
        assert!(matches!(result, Err(EnvError::InvalidTileSize(_))));
    }
}
