//! Distance-based visibility gating (level of detail).
//!
//! A child is visible when the camera distance `d` satisfies
//! `min ≤ d < max`. There is no hysteresis.

use geoplace_env::AnnotationId;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Closed-open camera distance interval `[min, max)` in scene units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodRange {
    min_distance: f64,
    max_distance: f64,
}

impl LodRange {
    /// Creates a range; `max` may be `f64::INFINITY`.
    pub fn new(min_distance: f64, max_distance: f64) -> Result<Self, LodError> {
        let valid = min_distance.is_finite()
            && !max_distance.is_nan()
            && min_distance >= 0.0
            && min_distance <= max_distance;
        if !valid {
            return Err(LodError::InvalidRange {
                min: min_distance,
                max: max_distance,
            });
        }
        Ok(Self {
            min_distance,
            max_distance,
        })
    }

    /// Visible at every distance.
    pub fn unbounded() -> Self {
        Self {
            min_distance: 0.0,
            max_distance: f64::INFINITY,
        }
    }

    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// `min ≤ distance < max`
    pub fn contains(&self, distance: f64) -> bool {
        distance >= self.min_distance && distance < self.max_distance
    }

    pub fn state_at(&self, distance: f64) -> LodState {
        if self.contains(distance) {
            LodState::Visible
        } else {
            LodState::Hidden
        }
    }
}

/// Per-child visibility decided by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LodState {
    Visible,
    Hidden,
}

/// A group of annotations switched in and out by camera distance.
///
/// All children share the gate's centre, so they switch on the same
/// distance (like a scene-graph LOD node).
#[derive(Debug, Clone, PartialEq)]
pub struct LodGate {
    center: Point3<f64>,
    children: Vec<(AnnotationId, LodRange)>,
}

impl LodGate {
    /// Creates an empty gate measuring distance from `center`.
    pub fn new(center: Point3<f64>) -> Self {
        Self {
            center,
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, id: AnnotationId, range: LodRange) {
        self.children.push((id, range));
    }

    /// Removes a child; returns true if it was present.
    pub fn remove_child(&mut self, id: AnnotationId) -> bool {
        let before = self.children.len();
        self.children.retain(|(child, _)| *child != id);
        self.children.len() != before
    }

    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    pub fn set_center(&mut self, center: Point3<f64>) {
        self.center = center;
    }

    pub fn children(&self) -> &[(AnnotationId, LodRange)] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Evaluates every child at a camera distance from the centre.
    pub fn evaluate(&self, distance: f64) -> impl Iterator<Item = (AnnotationId, LodState)> + '_ {
        self.children
            .iter()
            .map(move |(id, range)| (*id, range.state_at(distance)))
    }

    /// Evaluates every child for a camera at `eye`.
    pub fn evaluate_from(&self, eye: &Point3<f64>) -> impl Iterator<Item = (AnnotationId, LodState)> + '_ {
        self.evaluate(nalgebra::distance(eye, &self.center))
    }
}

/// Errors for LOD configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LodError {
    #[error("Invalid LOD range [{min}, {max})")]
    InvalidRange { min: f64, max: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_open_boundaries() {
        let range = LodRange::new(0.0, 2e6).unwrap();
        assert_eq!(range.state_at(0.0), LodState::Visible);
        assert_eq!(range.state_at(1_999_999.999), LodState::Visible);
        assert_eq!(range.state_at(2e6), LodState::Hidden);

        let far = LodRange::new(1000.0, 5000.0).unwrap();
        assert_eq!(far.state_at(1000.0), LodState::Visible);
        assert_eq!(far.state_at(999.999), LodState::Hidden);
        assert_eq!(far.state_at(5000.0), LodState::Hidden);
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(LodRange::new(-1.0, 10.0).is_err());
        assert!(LodRange::new(10.0, 1.0).is_err());
        assert!(LodRange::new(f64::NAN, 1.0).is_err());
        assert!(LodRange::new(0.0, f64::NAN).is_err());
        assert!(LodRange::new(0.0, f64::INFINITY).is_ok());
    }

    #[test]
    fn test_empty_range_never_visible() {
        let range = LodRange::new(5.0, 5.0).unwrap();
        assert_eq!(range.state_at(5.0), LodState::Hidden);
    }

    #[test]
    fn test_unbounded_is_always_visible() {
        assert_eq!(LodRange::unbounded().state_at(1e12), LodState::Visible);
    }

    #[test]
    fn test_gate_switches_children_together() {
        let mut gate = LodGate::new(Point3::origin());
        let near = AnnotationId::from_seed(1);
        let far = AnnotationId::from_seed(2);
        gate.add_child(near, LodRange::new(0.0, 100.0).unwrap());
        gate.add_child(far, LodRange::new(100.0, f64::INFINITY).unwrap());

        let at_50: Vec<_> = gate.evaluate_from(&Point3::new(50.0, 0.0, 0.0)).collect();
        assert_eq!(at_50, vec![(near, LodState::Visible), (far, LodState::Hidden)]);

        let at_100: Vec<_> = gate.evaluate(100.0).collect();
        assert_eq!(at_100, vec![(near, LodState::Hidden), (far, LodState::Visible)]);

        assert!(gate.remove_child(near));
        assert!(!gate.remove_child(near));
        assert_eq!(gate.children().len(), 1);
    }
}
