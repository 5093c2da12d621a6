//! SimWorld - the demo scene, its maps and assets, and camera paths.

use crate::terrain::ProceduralTerrain;
use geoplace_core::config::{AnnotationSpec, LodSpec, PointSpec};
use geoplace_core::geoplace_camera::CameraError;
use geoplace_core::geoplace_style::{TextAlignment, TextEncoding};
use geoplace_core::{
    AltitudeMode, AnnotationContent, Camera, Color, Ellipsoid, MapContext, SceneSpec, SpatialReference,
    StaticMapLoader, Style,
};
use geoplace_env::{AssetLoader, EnvError, FsAssetLoader, MemoryAssetLoader, PagedElevation};
use nalgebra::Vector3;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub const PLACEMARK_ICON: &str = "../data/placemark32.png";
pub const COW_MODEL: &str = "../data/cow.osgt";
pub const CESSNA_MODEL: &str = "../data/cessna.osg.1000.scale";

/// Map with terrain available immediately
pub const GLOBE_MAP: &str = "globe";

/// Map whose terrain pages in from a slow background source
pub const PAGED_GLOBE_MAP: &str = "globe_paged";

/// Every map descriptor the simulator can load
pub const MAP_NAMES: &[&str] = &[GLOBE_MAP, PAGED_GLOBE_MAP];

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Frames per scenario
    pub frames: u64,

    /// Viewport width in pixels
    pub width: u32,

    /// Viewport height in pixels
    pub height: u32,

    /// Load assets from this directory instead of the built-in registry
    pub asset_root: Option<PathBuf>,

    /// Latency of background terrain tiles
    pub tile_delay: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            frames: 60,
            width: 1024,
            height: 768,
            asset_root: None,
            tile_delay: Duration::from_millis(20),
        }
    }
}

impl SimConfig {
    /// Asset loader for this run.
    pub fn assets(&self) -> Arc<dyn AssetLoader> {
        match &self.asset_root {
            Some(root) => Arc::new(FsAssetLoader::new(root)),
            None => Arc::new(demo_assets()),
        }
    }

    /// The maps a scene can name. The paged map fetches on `handle`.
    pub fn maps(&self, handle: Handle) -> Result<StaticMapLoader, EnvError> {
        let terrain = ProceduralTerrain::new(self.seed);
        let paged = PagedElevation::new(terrain.clone().with_fetch_delay(self.tile_delay), 1.0, handle)?;

        Ok(StaticMapLoader::new()
            .with_map(MapContext::new(GLOBE_MAP, SpatialReference::wgs84(), Arc::new(terrain)))
            .with_map(MapContext::new(PAGED_GLOBE_MAP, SpatialReference::wgs84(), Arc::new(paged))))
    }
}

/// The built-in asset registry.
pub fn demo_assets() -> MemoryAssetLoader {
    MemoryAssetLoader::new()
        .with_image(PLACEMARK_ICON, 32, 32)
        .with_model(COW_MODEL, 1.0)
        .with_model(CESSNA_MODEL, 1.0)
}

// ============================================================================
// DEMO SCENE
// ============================================================================

fn point(latitude: f64, longitude: f64, altitude: f64, altitude_mode: AltitudeMode) -> PointSpec {
    PointSpec {
        latitude,
        longitude,
        altitude,
        altitude_mode,
    }
}

fn annotation(content: AnnotationContent, style: &str, point: PointSpec) -> AnnotationSpec {
    AnnotationSpec {
        content,
        style: style.to_string(),
        point,
        lod: None,
        scale: None,
        gate: None,
    }
}

fn place(text: &str, latitude: f64, longitude: f64) -> AnnotationSpec {
    annotation(
        AnnotationContent::Place { text: text.to_string() },
        "place",
        point(latitude, longitude, 0.0, AltitudeMode::RelativeToGround),
    )
}

/// Styles shared by the demo and generated scenes.
pub fn demo_styles() -> Vec<(String, Style)> {
    let mut label = Style::new();
    label.text_mut().fill = Color::YELLOW;
    label.text_mut().alignment = TextAlignment::CenterCenter;

    let mut place = Style::new();
    place.icon_mut().url = Some(PathBuf::from(PLACEMARK_ICON));
    place.icon_mut().declutter = true;
    let text = place.text_mut();
    text.halo = Some(Color::from_rgba8(0x5f, 0x5f, 0x5f, 0xff));
    text.encoding = TextEncoding::Utf8;
    text.font = Some("simhei.ttf".to_string());

    let mut cow = Style::new();
    cow.model_mut().url = Some(PathBuf::from(COW_MODEL));

    let mut cessna = Style::new();
    cessna.model_mut().url = Some(PathBuf::from(CESSNA_MODEL));
    cessna.model_mut().auto_scale = false;

    vec![
        ("label".to_string(), label),
        ("place".to_string(), place),
        ("cow".to_string(), cow),
        ("cessna".to_string(), cessna),
    ]
}

/// Places, a distance-gated place and two models around the globe.
pub fn demo_scene() -> SceneSpec {
    let mut prague = place("Prague", 50.0, 14.68);
    prague.lod = Some(LodSpec {
        min: 0.0,
        max: Some(2e6),
    });

    let mut chicago = place("Chicago", 41.90, -87.65);
    chicago.point = point(41.90, -87.65, 1000.0, AltitudeMode::Absolute);

    let mut cow = annotation(
        AnnotationContent::Model { url: None },
        "cow",
        point(40.0, 116.0, 0.0, AltitudeMode::RelativeToGround),
    );
    cow.scale = Some([10_000.0; 3]);

    let cessna = annotation(
        AnnotationContent::Model { url: None },
        "cessna",
        point(38.0, 121.0, 50_000.0, AltitudeMode::Absolute),
    );

    SceneSpec {
        map: GLOBE_MAP.to_string(),
        styles: demo_styles().into_iter().collect(),
        annotations: vec![
            place("New York", 40.71, -74.00),
            place("北京", 39.90556, 116.42472),
            prague,
            chicago,
            cow,
            cessna,
        ],
    }
}

// ============================================================================
// CAMERA PATHS
// ============================================================================

/// A camera pose: straight down over a geodetic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraKey {
    pub latitude: f64,
    pub longitude: f64,
    /// Height of the eye above the ellipsoid, in meters
    pub range: f64,
}

impl CameraKey {
    pub fn new(latitude: f64, longitude: f64, range: f64) -> Self {
        Self {
            latitude,
            longitude,
            range,
        }
    }
}

/// Piecewise-linear flight through camera keys.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPath {
    keys: Vec<CameraKey>,
}

impl CameraPath {
    pub fn new(keys: Vec<CameraKey>) -> Self {
        Self { keys }
    }

    /// A fixed camera.
    pub fn hold(key: CameraKey) -> Self {
        Self::new(vec![key])
    }

    /// One turn around the globe at constant latitude and range.
    pub fn orbit(latitude: f64, range: f64) -> Self {
        Self::new(
            (0..=8)
                .map(|i| CameraKey::new(latitude, -180.0 + 45.0 * i as f64, range))
                .collect(),
        )
    }

    /// Straight descent over one point.
    pub fn approach(latitude: f64, longitude: f64, from_range: f64, to_range: f64) -> Self {
        Self::new(vec![
            CameraKey::new(latitude, longitude, from_range),
            CameraKey::new(latitude, longitude, to_range),
        ])
    }

    /// Pose at `t` in [0, 1].
    pub fn at(&self, t: f64) -> CameraKey {
        let Some(first) = self.keys.first() else {
            return CameraKey::new(0.0, 0.0, 1e7);
        };
        if self.keys.len() == 1 {
            return *first;
        }

        let span = (self.keys.len() - 1) as f64;
        let s = t.clamp(0.0, 1.0) * span;
        let i = (s.floor() as usize).min(self.keys.len() - 2);
        let (a, b) = (self.keys[i], self.keys[i + 1]);

        let va = Vector3::new(a.latitude, a.longitude, a.range);
        let vb = Vector3::new(b.latitude, b.longitude, b.range);
        let v = va.lerp(&vb, s - i as f64);
        CameraKey::new(v.x, wrap_longitude(v.y), v.z)
    }

    /// Camera for `frame` of `frames`.
    pub fn camera(
        &self,
        ellipsoid: &Ellipsoid,
        frame: u64,
        frames: u64,
        width: u32,
        height: u32,
    ) -> Result<(CameraKey, Camera), CameraError> {
        let t = if frames > 1 {
            frame as f64 / (frames - 1) as f64
        } else {
            0.0
        };
        let key = self.at(t);
        let camera = Camera::look_at_geodetic(ellipsoid, key.latitude, key.longitude, key.range, width, height)?;
        Ok((key, camera))
    }
}

/// Maps any longitude into (-180, 180].
pub fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoplace_core::{ComposerConfig, MapLoader, SceneComposer};

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(-180.0), 180.0);
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert_eq!(wrap_longitude(190.0), -170.0);
        assert_eq!(wrap_longitude(-74.0), -74.0);
    }

    #[test]
    fn test_orbit_path_interpolates() {
        let path = CameraPath::orbit(30.0, 2e7);
        assert_eq!(path.at(0.0).longitude, 180.0);
        assert_eq!(path.at(0.5).longitude, 0.0);
        assert_eq!(path.at(0.5).range, 2e7);

        let approach = CameraPath::approach(50.0, 14.68, 1e7, 5e5);
        assert_eq!(approach.at(1.0).range, 5e5);
        assert!((approach.at(0.5).range - 5.25e6).abs() < 1e-6);
    }

    #[test]
    fn test_every_frame_has_a_camera() {
        let path = CameraPath::orbit(30.0, 2e7);
        let ellipsoid = Ellipsoid::wgs84();
        for frame in 0..20 {
            assert!(path.camera(&ellipsoid, frame, 20, 800, 600).is_ok());
        }
    }

    #[test]
    fn test_demo_scene_composes_completely() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let config = SimConfig::default();
        let scene = demo_scene();
        let map = config.maps(runtime.handle().clone()).unwrap().load(&scene.map).unwrap();
        let mut composer = SceneComposer::new(map, config.assets(), ComposerConfig::default());

        let report = scene.compose_into(&mut composer);
        assert!(report.is_complete());
        assert_eq!(report.added.len(), 6);
        assert_eq!(composer.gate_count(), 1);
    }

    #[test]
    fn test_missing_asset_root_omits_models_only() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let config = SimConfig {
            asset_root: Some(PathBuf::from("/nonexistent/assets")),
            ..Default::default()
        };
        let scene = demo_scene();
        let map = config.maps(runtime.handle().clone()).unwrap().load(&scene.map).unwrap();
        let mut composer = SceneComposer::new(map, config.assets(), ComposerConfig::default());

        let report = scene.compose_into(&mut composer);
        assert_eq!(report.added.len(), 4);
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn test_map_names_match_loader() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let maps = SimConfig::default().maps(runtime.handle().clone()).unwrap();
        let mut names = maps.names();
        names.sort();
        assert_eq!(names, MAP_NAMES);
    }
}
