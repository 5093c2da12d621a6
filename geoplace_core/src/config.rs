//! Scene description loaded from JSON.
//!
//! ```json
//! {
//!   "map": "globe",
//!   "styles": { "label": { "text": { "fill": "yellow" } } },
//!   "annotations": [
//!     { "kind": "label", "text": "Prague", "style": "label",
//!       "point": { "latitude": 50.0, "longitude": 14.68 },
//!       "lod": { "min": 0.0, "max": 2000000.0 } }
//!   ]
//! }
//! ```

use crate::geoplace_lod::LodRange;
use crate::geoplace_placement::PlacementError;
use crate::geoplace_scene::{
    AnnotationContent, AnnotationRequest, ComposeError, CompositionFailure, CompositionReport, SceneComposer,
};
use crate::geoplace_srs::{AltitudeMode, GeodeticPoint, SpatialReference};
use crate::geoplace_style::Style;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Anchor position in geographic degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSpec {
    pub latitude: f64,
    pub longitude: f64,

    #[serde(default)]
    pub altitude: f64,

    #[serde(default)]
    pub altitude_mode: AltitudeMode,
}

/// Distance range; a missing `max` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodSpec {
    #[serde(default)]
    pub min: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl LodSpec {
    pub fn to_range(&self) -> Result<LodRange, ComposeError> {
        Ok(LodRange::new(self.min, self.max.unwrap_or(f64::INFINITY))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSpec {
    #[serde(flatten)]
    pub content: AnnotationContent,

    /// Key into [`SceneSpec::styles`]
    pub style: String,

    pub point: PointSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lod: Option<LodSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f64; 3]>,

    /// Annotations naming the same gate switch together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
}

/// A complete scene: the map to load, named styles and annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSpec {
    pub map: String,

    #[serde(default)]
    pub styles: BTreeMap<String, Style>,

    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
}

impl SceneSpec {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Styles frozen for sharing.
    pub fn shared_styles(&self) -> BTreeMap<String, Arc<Style>> {
        self.styles
            .iter()
            .map(|(name, style)| (name.clone(), Arc::new(style.clone())))
            .collect()
    }

    /// Builds the request for one annotation.
    pub fn to_request(
        &self,
        spec: &AnnotationSpec,
        srs: &Arc<SpatialReference>,
        styles: &BTreeMap<String, Arc<Style>>,
    ) -> Result<AnnotationRequest, ComposeError> {
        let style = styles
            .get(&spec.style)
            .cloned()
            .ok_or_else(|| ComposeError::UnknownStyle(spec.style.clone()))?;

        let p = spec.point;
        let point = GeodeticPoint::new(srs.clone(), p.longitude, p.latitude, p.altitude, p.altitude_mode)
            .map_err(PlacementError::from)?;

        Ok(AnnotationRequest {
            point,
            content: spec.content.clone(),
            style,
            lod: spec.lod.map(|l| l.to_range()).transpose()?,
            scale: spec.scale.map(|[x, y, z]| Vector3::new(x, y, z)),
        })
    }

    /// Adds every annotation to `composer`.
    ///
    /// Members of a named gate are added together at the position of the
    /// first member. Failure indices refer to [`SceneSpec::annotations`].
    pub fn compose_into(&self, composer: &mut SceneComposer) -> CompositionReport {
        let srs = composer.resolver().map_srs().clone();
        let styles = self.shared_styles();
        let mut report = CompositionReport::default();
        let mut gates_done = HashSet::new();

        for (index, spec) in self.annotations.iter().enumerate() {
            match &spec.gate {
                None => match self.to_request(spec, &srs, &styles).and_then(|r| composer.add(r)) {
                    Ok(id) => {
                        if composer.get(id).is_some_and(|n| n.placement.is_degraded()) {
                            report.degraded += 1;
                        }
                        report.added.push(id);
                    }
                    Err(error) => {
                        warn!("Omitting annotation #{}: {}", index, error);
                        report.failures.push(CompositionFailure { index, error });
                    }
                },
                Some(gate) => {
                    if !gates_done.insert(gate.clone()) {
                        continue;
                    }

                    let mut requests = Vec::new();
                    let mut positions = Vec::new();
                    for (member_index, member) in self.annotations.iter().enumerate().skip(index) {
                        if member.gate.as_ref() != Some(gate) {
                            continue;
                        }
                        match self.to_request(member, &srs, &styles) {
                            Ok(request) => {
                                requests.push(request);
                                positions.push(member_index);
                            }
                            Err(error) => {
                                warn!("Omitting gated annotation #{}: {}", member_index, error);
                                report.failures.push(CompositionFailure {
                                    index: member_index,
                                    error,
                                });
                            }
                        }
                    }

                    let gated = composer.add_lod_gate(requests);
                    report.added.extend(gated.added);
                    report.degraded += gated.degraded;
                    report.failures.extend(gated.failures.into_iter().map(|f| CompositionFailure {
                        index: positions[f.index],
                        error: f.error,
                    }));
                }
            }
        }

        report.failures.sort_by_key(|f| f.index);
        report
    }
}

/// Errors reading a scene description.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read scene file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scene description: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoplace_scene::{ComposerConfig, MapContext};
    use crate::geoplace_style::{Color, TextEncoding};
    use geoplace_env::{FlatElevation, MemoryAssetLoader};

    const SCENE: &str = r##"{
        "map": "globe",
        "styles": {
            "label": { "text": { "fill": "yellow", "alignment": "CENTER_CENTER" } },
            "place": {
                "icon": { "url": "../data/placemark32.png", "declutter": true },
                "text": { "halo": "#5f5f5f", "encoding": "UTF8", "font": "simhei.ttf" }
            }
        },
        "annotations": [
            { "kind": "place", "text": "New York", "style": "place",
              "point": { "latitude": 40.71, "longitude": -74.00 } },
            { "kind": "place", "text": "Prague", "style": "place",
              "point": { "latitude": 50.0, "longitude": 14.68 },
              "lod": { "min": 0.0, "max": 2000000.0 }, "gate": "europe" },
            { "kind": "label", "text": "Nowhere", "style": "missing",
              "point": { "latitude": 0.0, "longitude": 0.0 } },
            { "kind": "place", "text": "Chicago", "style": "place",
              "point": { "latitude": 41.90, "longitude": -87.65, "altitude": 1000.0, "altitude_mode": "ABSOLUTE" } },
            { "kind": "label", "text": "Bad", "style": "label",
              "point": { "latitude": 95.0, "longitude": 0.0 }, "gate": "europe" },
            { "kind": "label", "text": "Bad range", "style": "label",
              "point": { "latitude": 1.0, "longitude": 1.0 }, "lod": { "min": 5.0, "max": 1.0 } }
        ]
    }"##;

    fn composer() -> SceneComposer {
        let map = MapContext::new("globe", SpatialReference::wgs84(), Arc::new(FlatElevation(0.0)));
        let assets = MemoryAssetLoader::new().with_image("../data/placemark32.png", 32, 32);
        SceneComposer::new(map, Arc::new(assets), ComposerConfig::default())
    }

    #[test]
    fn test_parse_scene() {
        let scene = SceneSpec::from_json_str(SCENE).unwrap();
        assert_eq!(scene.map, "globe");
        assert_eq!(scene.annotations.len(), 6);
        assert_eq!(scene.styles["label"].text.as_ref().unwrap().fill, Color::YELLOW);
        assert_eq!(scene.styles["place"].text.as_ref().unwrap().encoding, TextEncoding::Utf8);
        assert_eq!(scene.annotations[3].point.altitude_mode, AltitudeMode::Absolute);
        assert_eq!(scene.annotations[0].point.altitude_mode, AltitudeMode::RelativeToGround);
        assert_eq!(
            scene.annotations[0].content,
            AnnotationContent::Place {
                text: "New York".into()
            }
        );
    }

    #[test]
    fn test_compose_reports_each_failure_by_index() {
        let scene = SceneSpec::from_json_str(SCENE).unwrap();
        let mut composer = composer();
        let report = scene.compose_into(&mut composer);

        assert_eq!(report.added.len(), 3);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![2, 4, 5]);
        assert!(matches!(report.failures[0].error, ComposeError::UnknownStyle(_)));
        assert!(matches!(report.failures[1].error, ComposeError::Placement(PlacementError::Srs(_))));
        assert!(matches!(report.failures[2].error, ComposeError::Lod(_)));
        assert_eq!(composer.gate_count(), 1);
    }

    #[test]
    fn test_round_trip_keeps_unbounded_lod() {
        let lod = LodSpec { min: 10.0, max: None };
        assert_eq!(lod.to_range().unwrap().max_distance(), f64::INFINITY);

        let scene = SceneSpec::from_json_str(SCENE).unwrap();
        let again = SceneSpec::from_json_str(&scene.to_json_string().unwrap()).unwrap();
        assert_eq!(again.annotations.len(), scene.annotations.len());
        assert_eq!(again.annotations[1].gate.as_deref(), Some("europe"));
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        assert!(matches!(SceneSpec::from_json_str("{"), Err(ConfigError::Json(_))));
        assert!(matches!(SceneSpec::from_file("/no/such/scene.json"), Err(ConfigError::Io(_))));
    }
}
