//! The "DECLUTTER" Engine - screen-space overlap suppression
//!
//! Each frame, every declutter-eligible annotation contributes a screen box.
//! Candidates are swept in priority order (closest first) and a candidate
//! survives only if its padded box overlaps no box that already survived.
//! Survivors are kept in an R-tree, so each test costs O(log n).
//!
//! ## Ordering
//! - Lower priority value wins (priority = camera distance)
//! - Ties: candidates visible last frame first, then insertion order
//! - NaN priorities sort last
//!
//! The result is a pure function of the candidate list and the previous
//! frame's visible set, so identical inputs always give identical output.

use geo::{coord, Rect};
use geoplace_env::AnnotationId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclutterConfig {
    /// Margin added around every box, in pixels
    pub padding_px: f64,

    /// Most candidates swept per frame; the rest are suppressed
    pub max_candidates: usize,
}

impl Default for DeclutterConfig {
    fn default() -> Self {
        Self {
            padding_px: 3.0,
            max_candidates: 4096,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// One annotation competing for screen space this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclutterCandidate {
    pub id: AnnotationId,

    /// Screen box in pixels (y down)
    pub bounds: Rect<f64>,

    /// Lower wins
    pub priority: f64,

    /// Insertion order, the final tie-break
    pub sequence: u64,
}

/// Outcome of one declutter pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclutterResult {
    /// Survivors in acceptance order
    pub visible: Vec<AnnotationId>,

    /// Suppressed candidates in sweep order
    pub suppressed: Vec<AnnotationId>,
}

impl DeclutterResult {
    pub fn is_visible(&self, id: AnnotationId) -> bool {
        self.visible.contains(&id)
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Stateful declutter pass; remembers last frame's survivors.
#[derive(Debug, Clone, Default)]
pub struct DeclutterEngine {
    config: DeclutterConfig,
    previous_visible: HashSet<AnnotationId>,
}

impl DeclutterEngine {
    pub fn new(config: DeclutterConfig) -> Self {
        Self {
            config,
            previous_visible: HashSet::new(),
        }
    }

    pub fn config(&self) -> &DeclutterConfig {
        &self.config
    }

    /// True if `id` survived the previous pass.
    pub fn was_visible(&self, id: AnnotationId) -> bool {
        self.previous_visible.contains(&id)
    }

    /// Forgets the previous frame.
    pub fn reset(&mut self) {
        self.previous_visible.clear();
    }

    /// Runs one frame.
    pub fn declutter(&mut self, candidates: &[DeclutterCandidate]) -> DeclutterResult {
        let mut order: Vec<&DeclutterCandidate> = candidates.iter().collect();
        order.sort_by(|a, b| self.compare(a, b));

        let mut accepted: RTree<AcceptedBox> = RTree::new();
        let mut result = DeclutterResult::default();

        for (rank, candidate) in order.into_iter().enumerate() {
            if rank >= self.config.max_candidates || !is_finite_rect(&candidate.bounds) {
                result.suppressed.push(candidate.id);
                continue;
            }

            let padded = pad(&candidate.bounds, self.config.padding_px);
            if overlaps_accepted(&accepted, &padded) {
                result.suppressed.push(candidate.id);
            } else {
                accepted.insert(AcceptedBox { rect: padded });
                result.visible.push(candidate.id);
            }
        }

        debug!(
            "Declutter: {} candidates, {} visible, {} suppressed",
            candidates.len(),
            result.visible.len(),
            result.suppressed.len()
        );

        self.previous_visible = result.visible.iter().copied().collect();
        result
    }

    fn compare(&self, a: &DeclutterCandidate, b: &DeclutterCandidate) -> Ordering {
        compare_priority(a.priority, b.priority)
            .then_with(|| self.was_visible(b.id).cmp(&self.was_visible(a.id)))
            .then_with(|| a.sequence.cmp(&b.sequence))
    }
}

/// Ascending, NaN last (all NaNs equal).
fn compare_priority(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

fn is_finite_rect(rect: &Rect<f64>) -> bool {
    let (min, max) = (rect.min(), rect.max());
    min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()
}

fn pad(rect: &Rect<f64>, padding: f64) -> Rect<f64> {
    let (min, max) = (rect.min(), rect.max());
    Rect::new(
        coord! { x: min.x - padding, y: min.y - padding },
        coord! { x: max.x + padding, y: max.y + padding },
    )
}

/// Positive-area intersection; shared edges do not count.
fn strictly_overlaps(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

// ============================================================================
// ACCEPTED-BOX INDEX
// ============================================================================

/// A padded box that survived this frame.
struct AcceptedBox {
    rect: Rect<f64>,
}

impl RTreeObject for AcceptedBox {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.rect)
    }
}

fn envelope_of(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Whether `rect` has positive-area overlap with any accepted box.
///
/// The envelope query also returns boxes that merely touch; the strict test
/// filters those out.
fn overlaps_accepted(tree: &RTree<AcceptedBox>, rect: &Rect<f64>) -> bool {
    tree.locate_in_envelope_intersecting(&envelope_of(rect))
        .any(|accepted| strictly_overlaps(&accepted.rect, rect))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(seq: u64, x: f64, y: f64, w: f64, h: f64, priority: f64) -> DeclutterCandidate {
        DeclutterCandidate {
            id: AnnotationId::from_seed(seq),
            bounds: Rect::new(coord! { x: x, y: y }, coord! { x: x + w, y: y + h }),
            priority,
            sequence: seq,
        }
    }

    fn unpadded() -> DeclutterEngine {
        DeclutterEngine::new(DeclutterConfig {
            padding_px: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_disjoint_candidates_all_survive() {
        let mut engine = DeclutterEngine::default();
        let candidates: Vec<_> = (0..50)
            .map(|i| candidate(i, (i % 10) as f64 * 100.0, (i / 10) as f64 * 50.0, 60.0, 20.0, i as f64))
            .collect();

        let result = engine.declutter(&candidates);
        assert_eq!(result.visible.len(), 50);
        assert!(result.suppressed.is_empty());
    }

    #[test]
    fn test_labels_two_pixels_apart_leave_one_survivor() {
        let mut engine = DeclutterEngine::default();
        let near = candidate(0, 100.0, 100.0, 80.0, 20.0, 10.0);
        let far = candidate(1, 182.0, 100.0, 80.0, 20.0, 20.0);

        let result = engine.declutter(&[far.clone(), near.clone()]);
        assert_eq!(result.visible, vec![near.id]);
        assert_eq!(result.suppressed, vec![far.id]);
    }

    #[test]
    fn test_touching_edges_do_not_overlap() {
        let mut engine = unpadded();
        let a = candidate(0, 0.0, 0.0, 10.0, 10.0, 1.0);
        let b = candidate(1, 10.0, 0.0, 10.0, 10.0, 1.0);
        let c = candidate(2, 0.0, 10.0, 10.0, 10.0, 1.0);

        assert_eq!(engine.declutter(&[a, b, c]).visible.len(), 3);
    }

    #[test]
    fn test_equal_priority_keeps_first_inserted() {
        let a = candidate(0, 0.0, 0.0, 50.0, 20.0, 5.0);
        let b = candidate(1, 10.0, 5.0, 50.0, 20.0, 5.0);

        for _ in 0..10 {
            let mut engine = DeclutterEngine::default();
            let result = engine.declutter(&[b.clone(), a.clone()]);
            assert_eq!(result.visible, vec![a.id]);
        }
    }

    #[test]
    fn test_previously_visible_wins_ties() {
        let mut engine = DeclutterEngine::default();
        let a = candidate(0, 0.0, 0.0, 50.0, 20.0, 5.0);
        let b = candidate(1, 10.0, 5.0, 50.0, 20.0, 5.0);

        // Frame 1: only b competes
        assert_eq!(engine.declutter(&[b.clone()]).visible, vec![b.id]);
        assert!(engine.was_visible(b.id));

        // Frame 2: a joins at equal priority; b stays
        assert_eq!(engine.declutter(&[a.clone(), b.clone()]).visible, vec![b.id]);

        engine.reset();
        assert_eq!(engine.declutter(&[a.clone(), b.clone()]).visible, vec![a.id]);
    }

    #[test]
    fn test_stickiness_never_overrides_priority() {
        let mut engine = DeclutterEngine::default();
        let a = candidate(0, 0.0, 0.0, 50.0, 20.0, 1.0);
        let b = candidate(1, 10.0, 5.0, 50.0, 20.0, 5.0);

        engine.declutter(&[b.clone()]);
        assert_eq!(engine.declutter(&[a.clone(), b.clone()]).visible, vec![a.id]);
    }

    #[test]
    fn test_nan_priority_sorts_last() {
        let mut engine = DeclutterEngine::default();
        let broken = candidate(0, 0.0, 0.0, 50.0, 20.0, f64::NAN);
        let good = candidate(1, 10.0, 5.0, 50.0, 20.0, 1e9);

        let result = engine.declutter(&[broken.clone(), good.clone()]);
        assert_eq!(result.visible, vec![good.id]);
        assert_eq!(result.suppressed, vec![broken.id]);
    }

    #[test]
    fn test_frame_budget_suppresses_the_tail() {
        let mut engine = DeclutterEngine::new(DeclutterConfig {
            max_candidates: 3,
            ..Default::default()
        });
        let candidates: Vec<_> = (0..6).map(|i| candidate(i, i as f64 * 200.0, 0.0, 10.0, 10.0, i as f64)).collect();

        let result = engine.declutter(&candidates);
        let expected: Vec<_> = (0..3).map(AnnotationId::from_seed).collect();
        assert_eq!(result.visible, expected);
        assert_eq!(result.suppressed.len(), 3);
    }

    #[test]
    fn test_oversized_box_blocks_everything_under_it() {
        let mut engine = unpadded();
        let huge = candidate(0, -1e6, -1e6, 2e6, 2e6, 0.0);
        let small = candidate(1, 10.0, 10.0, 5.0, 5.0, 1.0);

        let result = engine.declutter(&[small.clone(), huge.clone()]);
        assert_eq!(result.visible, vec![huge.id]);
        assert_eq!(result.suppressed, vec![small.id]);
    }

    #[test]
    fn test_many_small_boxes_inside_a_huge_one() {
        let mut engine = unpadded();
        let mut candidates = vec![candidate(0, -5e5, -5e5, 1e6, 1e6, 0.0)];
        candidates.extend((1..1000).map(|i| candidate(i, (i % 40) as f64 * 25.0, (i / 40) as f64 * 25.0, 10.0, 10.0, 1.0)));

        let result = engine.declutter(&candidates);
        assert_eq!(result.visible, vec![AnnotationId::from_seed(0)]);
        assert_eq!(result.suppressed.len(), 999);
    }

    #[test]
    fn test_survivors_never_overlap() {
        let mut engine = DeclutterEngine::default();
        let candidates: Vec<_> = (0..200)
            .map(|i| {
                let x = ((i * 37) % 400) as f64;
                let y = ((i * 91) % 300) as f64;
                candidate(i, x, y, 40.0, 12.0, ((i * 13) % 17) as f64)
            })
            .collect();

        let result = engine.declutter(&candidates);
        let visible: Vec<_> = candidates.iter().filter(|c| result.is_visible(c.id)).collect();
        for (i, a) in visible.iter().enumerate() {
            for b in &visible[i + 1..] {
                assert!(!strictly_overlaps(&a.bounds, &b.bounds));
            }
        }
        assert_eq!(result.visible.len() + result.suppressed.len(), 200);
    }
}
