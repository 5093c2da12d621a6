//! geoplace Deterministic Scene Simulation
//!
//! This crate flies a camera through composed scenes and checks, frame by
//! frame, that the visibility set honours its invariants.
//!
//! # Core Principle: Everything From One Seed
//!
//! - **Terrain**: procedural heights derived from the seed, served either
//!   synchronously or as slow background tiles
//! - **Scenes**: the demo scene, or seeded label storms
//! - **Cameras**: fixed piecewise-linear paths, no wall-clock input
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                        │
//! │  SceneSpec ──► SceneComposer ◄── MapContext (terrain)     │
//! │                     │                                     │
//! │  CameraPath ──► evaluate_frame ──► FrameVisibility        │
//! │                     │                   │                 │
//! │               MetricsAccumulator    SimExport (JSON)      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use geoplace_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_frames(60).run(ScenarioId::CloseLabels);
//! assert!(result.passed);
//! ```

mod exporter;
mod runner;
pub mod scenarios;
mod terrain;
mod world;

pub use exporter::{CameraPose, SimExport, SimFrame, VisibleEntry};
pub use runner::{close_labels_scene, storm_scene, ScenarioResult, ScenarioRunner, SimError};
pub use terrain::ProceduralTerrain;
pub use world::{
    demo_assets, demo_scene, demo_styles, wrap_longitude, CameraKey, CameraPath, SimConfig, GLOBE_MAP, MAP_NAMES,
    PAGED_GLOBE_MAP,
};
