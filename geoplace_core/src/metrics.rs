//! geoplace Metrics Module
//! =======================
//!
//! Per-frame counters produced by [`SceneComposer::evaluate_frame`] and a
//! run-level accumulator:
//! - **Visibility split**: visible / hidden by LOD / culled / decluttered
//! - **Degradation**: placements still waiting for terrain, and how many
//!   were re-resolved this frame
//! - **Flicker**: annotations whose visibility changed between frames
//!
//! [`SceneComposer::evaluate_frame`]: crate::SceneComposer::evaluate_frame

use geoplace_env::AnnotationId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Counters for one evaluated frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetrics {
    /// Annotations in the scene
    pub total: usize,

    pub visible: usize,

    pub hidden_by_lod: usize,

    /// Behind the eye, off screen or below the horizon
    pub culled: usize,

    pub decluttered: usize,

    /// Declutter candidates this frame
    pub candidates: usize,

    /// Placements still degraded after this frame's refresh
    pub degraded: usize,

    /// Placements re-resolved this frame
    pub refreshed: usize,
}

// =============================================================================
// RUN ACCUMULATION
// =============================================================================

/// Summary over a run of frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub frames: u64,

    pub mean_visible: f64,

    pub max_visible: usize,

    pub total_decluttered: u64,

    pub total_refreshed: u64,

    /// Frames that ended with at least one degraded placement
    pub degraded_frames: u64,

    /// Visibility changes between consecutive frames, summed over annotations
    pub flicker_events: u64,
}

/// Folds frames into a [`MetricsSummary`].
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    summary: MetricsSummary,
    visible_sum: u64,
    last_visible: Option<HashSet<AnnotationId>>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one frame given its metrics and visible ids.
    pub fn record<'a>(&mut self, metrics: &FrameMetrics, visible: impl IntoIterator<Item = &'a AnnotationId>) {
        let visible: HashSet<AnnotationId> = visible.into_iter().copied().collect();

        let s = &mut self.summary;
        s.frames += 1;
        s.max_visible = s.max_visible.max(metrics.visible);
        s.total_decluttered += metrics.decluttered as u64;
        s.total_refreshed += metrics.refreshed as u64;
        if metrics.degraded > 0 {
            s.degraded_frames += 1;
        }
        self.visible_sum += metrics.visible as u64;
        s.mean_visible = self.visible_sum as f64 / s.frames as f64;

        if let Some(last) = &self.last_visible {
            s.flicker_events += last.symmetric_difference(&visible).count() as u64;
        }
        self.last_visible = Some(visible);
    }

    pub fn summary(&self) -> &MetricsSummary {
        &self.summary
    }

    pub fn into_summary(self) -> MetricsSummary {
        self.summary
    }
}
