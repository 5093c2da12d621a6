//! Scenario runner - drives scenes through camera paths and checks the
//! visibility invariants frame by frame.

use crate::exporter::{SimExport, SimFrame};
use crate::scenarios::ScenarioId;
use crate::world::{demo_scene, CameraPath, CameraKey, SimConfig, PAGED_GLOBE_MAP};

use geo::Rect;
use geoplace_core::config::{AnnotationSpec, PointSpec};
use geoplace_core::geoplace_camera::CameraError;
use geoplace_core::geoplace_scene::AnnotationPayload;
use geoplace_core::geoplace_style::TextAlignment;
use geoplace_core::{
    AltitudeMode, AnnotationContent, Camera, ComposeError, ComposerConfig, CompositionReport, DeclutterEngine,
    FrameVisibility, MapLoader, MetricsAccumulator, MetricsSummary, SceneComposer, SceneSpec, Style,
};
use geoplace_env::{AnnotationId, EnvError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// LOD range of the gated place in the demo scene
const PRAGUE_MAX_DISTANCE: f64 = 2e6;

/// Wall-clock pause between frames while terrain pages in
const PAGING_FRAME_INTERVAL: Duration = Duration::from_millis(10);

/// Labels generated for the storm
const STORM_LABELS: usize = 500;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Frames evaluated
    pub total_frames: u64,

    /// Annotations composed into the scene
    pub composed: usize,

    /// Annotations omitted during composition
    pub omitted: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: MetricsSummary,
}

/// What a scenario body hands back to the runner.
struct Outcome {
    frames: u64,
    report: CompositionReport,
    summary: MetricsSummary,
    violation: Option<String>,
}

/// Per-frame assertion. Returns a failure message on violation.
type FrameCheck<'a> = dyn FnMut(u64, &Camera, &FrameVisibility, &SceneComposer) -> Result<(), String> + 'a;

/// Runs scene scenarios.
pub struct ScenarioRunner {
    config: SimConfig,

    /// Scene to use instead of the demo scene
    scene: Option<SceneSpec>,

    /// Map descriptor to use instead of the scene's
    map: Option<String>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            config: SimConfig {
                seed,
                ..SimConfig::default()
            },
            scene: None,
            map: None,
        }
    }

    /// Sets the number of frames per scenario.
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.config.frames = frames.max(1);
        self
    }

    /// Sets the viewport size.
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Uses a custom scene instead of the demo scene.
    pub fn with_scene(mut self, scene: SceneSpec) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Overrides the map descriptor.
    pub fn with_map(mut self, map: impl Into<String>) -> Self {
        self.map = Some(map.into());
        self
    }

    /// Loads assets from disk instead of the built-in registry.
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.asset_root = Some(root.into());
        self
    }

    /// Sets the latency of background terrain tiles.
    pub fn with_tile_delay(mut self, delay: Duration) -> Self {
        self.config.tile_delay = delay;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None)
    }

    /// Runs a scenario, recording every frame.
    pub fn run_exported(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.config.seed);
        let result = self.execute(scenario, Some(&mut export));
        export.finalize(result.passed, result.metrics.clone());
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);
        debug!("{}", scenario.description());

        let outcome = match scenario {
            ScenarioId::GlobeOrbit => self.run_globe_orbit(export),
            ScenarioId::PragueApproach => self.run_prague_approach(export),
            ScenarioId::LateTerrain => self.run_late_terrain(export),
            ScenarioId::LabelStorm => self.run_label_storm(export),
            ScenarioId::CloseLabels => self.run_close_labels(export),
        };

        match outcome {
            Ok(outcome) => {
                info!(
                    "{}: {} frames, {} annotations ({} omitted), mean visible {:.1}",
                    scenario.name(),
                    outcome.frames,
                    outcome.report.added.len(),
                    outcome.report.failures.len(),
                    outcome.summary.mean_visible
                );
                ScenarioResult {
                    scenario,
                    seed: self.config.seed,
                    passed: outcome.violation.is_none(),
                    total_frames: outcome.frames,
                    composed: outcome.report.added.len(),
                    omitted: outcome.report.failures.len(),
                    failure_reason: outcome.violation,
                    metrics: outcome.summary,
                }
            }
            Err(e) => {
                warn!("Scenario {} aborted: {}", scenario.name(), e);
                ScenarioResult {
                    scenario,
                    seed: self.config.seed,
                    passed: false,
                    total_frames: 0,
                    composed: 0,
                    omitted: 0,
                    failure_reason: Some(e.to_string()),
                    metrics: MetricsSummary::default(),
                }
            }
        }
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// SIM-001: GlobeOrbit - one turn at 20,000 km over latitude 30°.
    ///
    /// **Assertion**: gated places never show; every ungated annotation is
    /// seen at least once; non-auto-scaled models carry no scale factor.
    fn run_globe_orbit(&self, export: Option<&mut SimExport>) -> Result<Outcome, SimError> {
        let runtime = runtime()?;
        let scene = self.scene();
        let (mut composer, report) = self.stage(&runtime, &scene, None)?;
        let gated: HashSet<AnnotationId> =
            composer.annotations().iter().filter(|n| n.gate.is_some()).map(|n| n.id).collect();
        let ungated: HashSet<AnnotationId> =
            composer.annotations().iter().filter(|n| n.gate.is_none()).map(|n| n.id).collect();

        let mut seen = HashSet::new();
        let path = CameraPath::orbit(30.0, 2e7);
        let mut outcome = self.drive(&mut composer, &path, export, &mut || {}, &mut |_, _, frame, composer| {
            for v in &frame.visible {
                seen.insert(v.id);
                if gated.contains(&v.id) {
                    return Err(format!("gated annotation {} visible from orbit", v.id));
                }
                let fixed_model = composer
                    .get(v.id)
                    .is_some_and(|n| matches!(n.payload, AnnotationPayload::Model { auto_scale: false, .. }));
                if fixed_model && v.auto_scale.is_some() {
                    return Err(format!("model {} auto-scaled with auto_scale off", v.id));
                }
            }
            Ok(())
        })?;

        if outcome.violation.is_none() {
            if let Some(missing) = ungated.iter().find(|id| !seen.contains(*id)) {
                outcome.violation = Some(format!("annotation {} never visible during orbit", missing));
            }
        }
        outcome.report = report;
        Ok(outcome)
    }

    /// SIM-002: PragueApproach - descent from 10,000 km to 500 km.
    ///
    /// **Assertion**: Prague is gated out exactly while its camera distance
    /// is at least 2,000 km, and shown otherwise.
    fn run_prague_approach(&self, export: Option<&mut SimExport>) -> Result<Outcome, SimError> {
        let runtime = runtime()?;
        let scene = self.scene();
        let (mut composer, report) = self.stage(&runtime, &scene, None)?;
        let prague = find_by_text(&composer, "Prague").ok_or(SimError::MissingAnnotation("Prague"))?;

        let (mut hidden_frames, mut shown_frames) = (0u64, 0u64);
        let path = CameraPath::approach(50.0, 14.68, 1e7, 5e5);
        let mut outcome = self.drive(&mut composer, &path, export, &mut || {}, &mut |i, camera, frame, composer| {
            let anchor = composer.get(prague).map(|n| n.placement.anchor()).ok_or("Prague removed")?;
            let distance = camera.distance_to(&anchor);
            let hidden = frame.hidden_by_lod.contains(&prague);
            if hidden != (distance >= PRAGUE_MAX_DISTANCE) {
                return Err(format!(
                    "frame {}: Prague hidden={} at distance {:.0} m",
                    i, hidden, distance
                ));
            }
            if !hidden && !frame.is_visible(prague) {
                return Err(format!("frame {}: Prague in range but not drawn", i));
            }
            if hidden {
                hidden_frames += 1;
            } else {
                shown_frames += 1;
            }
            Ok(())
        })?;

        if outcome.violation.is_none() && (hidden_frames == 0 || shown_frames == 0) {
            outcome.violation = Some(format!(
                "LOD boundary never crossed ({} hidden, {} shown)",
                hidden_frames, shown_frames
            ));
        }
        outcome.report = report;
        Ok(outcome)
    }

    /// SIM-003: LateTerrain - the map's terrain pages in after composition.
    ///
    /// **Assertion**: ground-relative placements start degraded and all are
    /// re-resolved, each exactly once, before the run ends.
    fn run_late_terrain(&self, export: Option<&mut SimExport>) -> Result<Outcome, SimError> {
        let runtime = runtime()?;
        let scene = self.scene();
        let (mut composer, report) = self.stage(&runtime, &scene, Some(PAGED_GLOBE_MAP))?;
        let initially_degraded = report.degraded;
        info!("LateTerrain: {} placements waiting for terrain", initially_degraded);

        let path = CameraPath::hold(CameraKey::new(40.0, -80.0, 8e6));
        let mut pace = || runtime.block_on(async { tokio::time::sleep(PAGING_FRAME_INTERVAL).await });
        let mut last_degraded = initially_degraded;
        let mut outcome = self.drive(&mut composer, &path, export, &mut pace, &mut |_, _, frame, _| {
            last_degraded = frame.metrics.degraded;
            Ok(())
        })?;

        if outcome.violation.is_none() {
            outcome.violation = if initially_degraded == 0 {
                Some("no placement was degraded; terrain arrived too early".to_string())
            } else if last_degraded > 0 {
                Some(format!("{} placements still degraded after the last frame", last_degraded))
            } else if outcome.summary.total_refreshed != initially_degraded as u64 {
                Some(format!(
                    "{} re-resolutions for {} degraded placements",
                    outcome.summary.total_refreshed, initially_degraded
                ))
            } else {
                None
            };
        }
        outcome.report = report;
        Ok(outcome)
    }

    /// SIM-004: LabelStorm - seeded labels over the US east coast.
    ///
    /// **Assertion**: survivors never overlap (checked every frame), a
    /// static camera never flickers, and an independent rebuild of the
    /// scene declutters to the same survivors.
    fn run_label_storm(&self, export: Option<&mut SimExport>) -> Result<Outcome, SimError> {
        let runtime = runtime()?;
        let scene = storm_scene(self.config.seed);
        let (mut composer, report) = self.stage(&runtime, &scene, None)?;

        let key = CameraKey::new(40.0, -75.0, 2e6);
        let mut first_visible: Option<Vec<AnnotationId>> = None;
        let mut outcome = self.drive(&mut composer, &CameraPath::hold(key), export, &mut || {}, &mut |_, _, frame, _| {
            if first_visible.is_none() {
                first_visible = Some(frame.visible_ids().copied().collect());
            }
            Ok(())
        })?;

        if outcome.violation.is_none() && outcome.summary.flicker_events > 0 {
            outcome.violation = Some(format!(
                "{} flicker events with a static camera",
                outcome.summary.flicker_events
            ));
        }

        if outcome.violation.is_none() {
            let (mut rebuilt, _) = self.stage(&runtime, &scene, None)?;
            let camera = CameraPath::hold(key)
                .camera(rebuilt.resolver().ellipsoid(), 0, 1, self.config.width, self.config.height)?
                .1;
            let again: Vec<AnnotationId> = rebuilt
                .evaluate_frame(&camera, &mut DeclutterEngine::default())
                .visible_ids()
                .copied()
                .collect();
            if first_visible.as_ref() != Some(&again) {
                outcome.violation = Some("rebuilt scene decluttered differently".to_string());
            }
        }
        outcome.report = report;
        Ok(outcome)
    }

    /// SIM-005: CloseLabels - two labels 2 px apart next to New York and Chicago.
    ///
    /// **Assertion**: New York and Chicago are both drawn every frame; of the
    /// close pair exactly one, always the first inserted, survives.
    fn run_close_labels(&self, export: Option<&mut SimExport>) -> Result<Outcome, SimError> {
        let runtime = runtime()?;
        let scene = close_labels_scene(self.scene());
        let (mut composer, report) = self.stage(&runtime, &scene, None)?;

        let lookup = |text: &'static str| find_by_text(&composer, text).ok_or(SimError::MissingAnnotation(text));
        let (ny, chicago) = (lookup("New York")?, lookup("Chicago")?);
        let (left, right) = (lookup("close-left")?, lookup("close-right")?);

        let path = CameraPath::hold(CameraKey::new(41.0, -81.0, 5e6));
        let mut outcome = self.drive(&mut composer, &path, export, &mut || {}, &mut |i, _, frame, _| {
            if !frame.is_visible(ny) || !frame.is_visible(chicago) {
                return Err(format!("frame {}: New York or Chicago not drawn", i));
            }
            match (frame.is_visible(left), frame.is_visible(right)) {
                (true, false) => Ok(()),
                (a, b) => Err(format!("frame {}: close pair visibility ({}, {})", i, a, b)),
            }
        })?;
        outcome.report = report;
        Ok(outcome)
    }

    // ========================================================================
    // HARNESS
    // ========================================================================

    fn scene(&self) -> SceneSpec {
        self.scene.clone().unwrap_or_else(demo_scene)
    }

    /// Loads the map and composes `scene` on it.
    fn stage(
        &self,
        runtime: &Runtime,
        scene: &SceneSpec,
        default_map: Option<&str>,
    ) -> Result<(SceneComposer, CompositionReport), SimError> {
        let descriptor = self
            .map
            .as_deref()
            .or(default_map)
            .unwrap_or(scene.map.as_str());
        let map = self.config.maps(runtime.handle().clone())?.load(descriptor)?;

        let mut composer = SceneComposer::new(map, self.config.assets(), ComposerConfig::default());
        let report = scene.compose_into(&mut composer);
        Ok((composer, report))
    }

    /// Evaluates every frame of `path`, checking that no two decluttered
    /// survivors overlap plus the scenario's own `check`.
    fn drive(
        &self,
        composer: &mut SceneComposer,
        path: &CameraPath,
        mut export: Option<&mut SimExport>,
        pace: &mut dyn FnMut(),
        check: &mut FrameCheck<'_>,
    ) -> Result<Outcome, SimError> {
        let frames = self.config.frames;
        let mut engine = DeclutterEngine::default();
        let mut metrics = MetricsAccumulator::new();
        let mut violation = None;
        let mut evaluated = 0;

        for i in 0..frames {
            pace();
            let (key, camera) =
                path.camera(composer.resolver().ellipsoid(), i, frames, self.config.width, self.config.height)?;
            let frame = composer.evaluate_frame(&camera, &mut engine);
            evaluated += 1;
            metrics.record(&frame.metrics, frame.visible_ids());

            if let Some(export) = export.as_deref_mut() {
                export.add_frame(SimFrame::new(i, &key, &frame));
            }

            if i % 10 == 0 {
                debug!(
                    "  frame={} | visible={} | lod={} | culled={} | decluttered={}",
                    i,
                    frame.metrics.visible,
                    frame.metrics.hidden_by_lod,
                    frame.metrics.culled,
                    frame.metrics.decluttered
                );
            }

            if let Err(reason) = survivors_are_disjoint(&frame, composer).and_then(|_| check(i, &camera, &frame, composer)) {
                warn!("Violation at frame {}: {}", i, reason);
                violation = Some(reason);
                break;
            }
        }

        Ok(Outcome {
            frames: evaluated,
            report: CompositionReport::default(),
            summary: metrics.into_summary(),
            violation,
        })
    }
}

fn runtime() -> Result<Runtime, SimError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()?)
}

/// First annotation showing `text`.
fn find_by_text(composer: &SceneComposer, text: &str) -> Option<AnnotationId> {
    composer.annotations().iter().find_map(|n| match &n.payload {
        AnnotationPayload::Place { text: t, .. } | AnnotationPayload::Label { text: t, .. } if t == text => Some(n.id),
        _ => None,
    })
}

fn strictly_overlaps(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

/// Declutter survivors must not overlap each other.
fn survivors_are_disjoint(frame: &FrameVisibility, composer: &SceneComposer) -> Result<(), String> {
    let boxes: Vec<(AnnotationId, Rect<f64>)> = frame
        .visible
        .iter()
        .filter(|v| composer.get(v.id).is_some_and(|n| n.declutter))
        .filter_map(|v| v.bounds.map(|b| (v.id, b)))
        .collect();

    for (i, (a, box_a)) in boxes.iter().enumerate() {
        if let Some((b, _)) = boxes[i + 1..].iter().find(|(_, box_b)| strictly_overlaps(box_a, box_b)) {
            return Err(format!("survivors {} and {} overlap", a, b));
        }
    }
    Ok(())
}

// ============================================================================
// GENERATED SCENES
// ============================================================================

fn label_spec(text: String, style: &str, latitude: f64, longitude: f64) -> AnnotationSpec {
    AnnotationSpec {
        content: AnnotationContent::Label { text },
        style: style.to_string(),
        point: PointSpec {
            latitude,
            longitude,
            altitude: 0.0,
            altitude_mode: AltitudeMode::RelativeToGround,
        },
        lod: None,
        scale: None,
        gate: None,
    }
}

/// Seeded labels scattered over 10° x 10° around (40, -75).
pub fn storm_scene(seed: u64) -> SceneSpec {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut scene = demo_scene();
    scene.annotations = (0..STORM_LABELS)
        .map(|i| {
            let lat = rng.gen_range(35.0..45.0);
            let lon = rng.gen_range(-80.0..-70.0);
            label_spec(format!("L{:03}", i), "label", lat, lon)
        })
        .collect();
    scene
}

/// `base` plus two labels sharing an anchor with a 2 px gap between them.
pub fn close_labels_scene(mut base: SceneSpec) -> SceneSpec {
    let mut left = Style::new();
    left.text_mut().alignment = TextAlignment::RightCenter;
    left.text_mut().pixel_offset = [-1.0, 0.0];
    let mut right = Style::new();
    right.text_mut().alignment = TextAlignment::LeftCenter;
    right.text_mut().pixel_offset = [1.0, 0.0];

    base.styles.insert("close_left".to_string(), left);
    base.styles.insert("close_right".to_string(), right);
    base.annotations
        .push(label_spec("close-left".to_string(), "close_left", 45.0, -80.0));
    base.annotations
        .push(label_spec("close-right".to_string(), "close_right", 45.0, -80.0));
    base
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors that abort a scenario before its assertions run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("Camera setup failed: {0}")]
    Camera(#[from] CameraError),

    #[error("Terrain setup failed: {0}")]
    Env(#[from] EnvError),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Scene has no '{0}' annotation")]
    MissingAnnotation(&'static str),
}
