//! geoplace Core - Geo-Anchored Scene Placement
//!
//! This library turns geodetic coordinates into correctly oriented,
//! correctly scaled, visibility-managed scene content on a curved planet:
//! 1. **Frames**: East-North-Up tangent frames on a reference ellipsoid
//! 2. **Placement**: SRS reprojection + altitude modes + terrain clamping
//! 3. **Visibility**: closed-open LOD ranges and screen-space decluttering
//!
//! The [`SceneComposer`] ties these together and produces an explicit
//! per-frame [`FrameVisibility`] instead of toggling shared node state.

pub mod config;
pub mod geoplace_camera;
pub mod geoplace_declutter;
pub mod geoplace_frame;
pub mod geoplace_lod;
pub mod geoplace_placement;
pub mod geoplace_scene;
pub mod geoplace_srs;
pub mod geoplace_style;
pub mod metrics;

// Re-export key types for convenience
pub use config::{ConfigError, SceneSpec};
pub use geoplace_camera::{Camera, ScreenPoint};
pub use geoplace_declutter::{DeclutterConfig, DeclutterEngine};
pub use geoplace_frame::{Ellipsoid, LocalFrame};
pub use geoplace_lod::{LodGate, LodRange, LodState};
pub use geoplace_placement::{Placement, PlacementResolver, PlacementStatus};
pub use geoplace_scene::{
    AnnotationContent, AnnotationRequest, ComposeError, ComposerConfig, CompositionReport, FrameVisibility,
    MapContext, MapLoader, SceneComposer, StaticMapLoader,
};
pub use geoplace_srs::{AltitudeMode, GeodeticPoint, SpatialReference};
pub use geoplace_style::{Color, Style};
pub use metrics::{FrameMetrics, MetricsAccumulator, MetricsSummary};
