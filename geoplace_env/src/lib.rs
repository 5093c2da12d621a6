//! geoplace Environment Abstraction Layer
//!
//! This crate defines the narrow contracts through which the placement
//! kernel talks to the outside world:
//! - Terrain (`sample_elevation()`), possibly loaded in the background
//! - Assets (`load_model()`, `load_image()`)
//!
//! The kernel never blocks on any of them. A terrain source that has no
//! data yet answers [`ElevationSample::Unavailable`] and the caller
//! degrades gracefully until a later frame.
//!
//! # Example
//!
//! ```ignore
//! use geoplace_env::{ElevationSource, PagedElevation};
//!
//! let terrain = PagedElevation::new(source, 1.0, runtime.handle().clone())?;
//! match terrain.sample_elevation(40.71, -74.00) {
//!     ElevationSample::Height(h) => place_at(h),
//!     ElevationSample::Unavailable => place_degraded(),
//! }
//! ```

mod assets;
mod error;
mod terrain;
mod tokio_impl;
mod types;

pub use assets::{AssetLoader, FsAssetLoader, ImageAsset, MemoryAssetLoader, ModelAsset};
pub use error::EnvError;
pub use terrain::{ElevationSource, ElevationTile, FlatElevation, NoElevation, TileElevation};
pub use tokio_impl::{ElevationTileSource, PagedElevation};
pub use types::{AnnotationId, ElevationSample, TileKey};
