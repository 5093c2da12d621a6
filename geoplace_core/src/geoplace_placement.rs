//! The "PLACEMENT" Engine - anchoring content at geodetic points
//!
//! Converts a [`GeodeticPoint`] into a world transform:
//! 1. Reproject into the map's geographic SRS (if needed)
//! 2. Resolve the altitude mode against terrain (if ground-relative)
//! 3. Build the ENU frame on the map ellipsoid
//! 4. Pre-multiply an optional (non-)uniform scale
//!
//! Missing terrain never fails a placement: the terrain is taken as 0 and
//! the result is flagged [`PlacementStatus::Degraded`] so it can be
//! re-resolved once data arrives.

use crate::geoplace_frame::{radians_from_degrees, Ellipsoid, FrameError, LocalFrame};
use crate::geoplace_srs::{AltitudeMode, GeodeticPoint, Reprojector, SpatialReference, SrsError};
use geoplace_env::{ElevationSample, ElevationSource};
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Whether a placement used real terrain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementStatus {
    /// All inputs were available
    Resolved,

    /// Terrain was unavailable; placed as if terrain height were 0
    Degraded,
}

/// Local-to-world transform of a placed object: `frame · scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    frame: LocalFrame,
    scale: Vector3<f64>,
    matrix: Matrix4<f64>,
}

impl WorldTransform {
    fn new(frame: LocalFrame, scale: Vector3<f64>) -> Self {
        let matrix = frame.to_matrix() * Matrix4::new_nonuniform_scaling(&scale);
        Self { frame, scale, matrix }
    }

    /// The rigid ENU frame (without scale).
    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn scale(&self) -> Vector3<f64> {
        self.scale
    }

    /// Homogeneous local-to-world matrix including scale.
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// World position of the object's local origin.
    pub fn origin(&self) -> Point3<f64> {
        self.frame.origin()
    }

    /// Maps a point in model units to world coordinates.
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(local)
    }
}

/// A resolved anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub transform: WorldTransform,

    /// Geographic latitude in degrees (map SRS)
    pub latitude: f64,

    /// Geographic longitude in degrees (map SRS)
    pub longitude: f64,

    /// Height above the ellipsoid actually used, in meters
    pub height: f64,

    pub status: PlacementStatus,
}

impl Placement {
    pub fn is_degraded(&self) -> bool {
        self.status == PlacementStatus::Degraded
    }

    /// World position of the anchor.
    pub fn anchor(&self) -> Point3<f64> {
        self.transform.origin()
    }
}

/// Resolves geodetic points to world transforms on a map.
pub struct PlacementResolver {
    /// Geographic SRS of the map
    map_srs: Arc<SpatialReference>,

    reprojector: Arc<dyn Reprojector>,

    elevation: Arc<dyn ElevationSource>,
}

impl PlacementResolver {
    /// Creates a resolver for a map in `map_srs` (any kind; its geographic
    /// counterpart is used for placement).
    pub fn new(
        map_srs: &SpatialReference,
        reprojector: Arc<dyn Reprojector>,
        elevation: Arc<dyn ElevationSource>,
    ) -> Self {
        Self {
            map_srs: Arc::new(map_srs.geographic()),
            reprojector,
            elevation,
        }
    }

    /// The geographic SRS points are resolved in.
    pub fn map_srs(&self) -> &Arc<SpatialReference> {
        &self.map_srs
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        self.map_srs.ellipsoid()
    }

    /// Resolves a point to a world transform.
    ///
    /// # Arguments
    /// * `point` - Anchor position in any SRS the reprojector understands
    /// * `scale` - Optional pre-scale applied in the local frame
    ///
    /// # Errors
    /// Reprojection failures, out-of-domain coordinates and degenerate
    /// scales. Missing terrain is NOT an error (see [`PlacementStatus`]).
    pub fn resolve(
        &self,
        point: &GeodeticPoint,
        scale: Option<Vector3<f64>>,
    ) -> Result<Placement, PlacementError> {
        let scale = scale.unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0));
        if scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(PlacementError::InvalidScale([scale.x, scale.y, scale.z]));
        }

        let geographic = if point.srs().is_equivalent_to(&self.map_srs) {
            point.clone()
        } else {
            self.reprojector.reproject(point, &self.map_srs)?
        };

        let latitude = geographic.y();
        // -180° and 180° are the same meridian
        let longitude = if geographic.x() == -180.0 { 180.0 } else { geographic.x() };

        let (height, status) = match geographic.altitude_mode() {
            AltitudeMode::Absolute => (geographic.z(), PlacementStatus::Resolved),
            AltitudeMode::RelativeToGround => match self.elevation.sample_elevation(latitude, longitude) {
                ElevationSample::Height(terrain) => (terrain + geographic.z(), PlacementStatus::Resolved),
                ElevationSample::Unavailable => {
                    debug!(
                        "No elevation at ({:.5}, {:.5}); placing relative to height 0",
                        latitude, longitude
                    );
                    (geographic.z(), PlacementStatus::Degraded)
                }
            },
        };

        let (lat_rad, lon_rad) = radians_from_degrees(latitude, longitude);
        let frame = self.ellipsoid().compute_local_to_world(lat_rad, lon_rad, height)?;

        Ok(Placement {
            transform: WorldTransform::new(frame, scale),
            latitude,
            longitude,
            height,
            status,
        })
    }

    /// Re-resolves a degraded placement in place.
    ///
    /// Returns `true` if the placement changed (terrain became available).
    pub fn refresh(
        &self,
        point: &GeodeticPoint,
        scale: Option<Vector3<f64>>,
        placement: &mut Placement,
    ) -> Result<bool, PlacementError> {
        if !placement.is_degraded() {
            return Ok(false);
        }
        let fresh = self.resolve(point, scale)?;
        if fresh.is_degraded() {
            return Ok(false);
        }
        *placement = fresh;
        Ok(true)
    }

    /// Inverse of placement: (lat°, lon°, height) of a world point.
    pub fn world_to_geodetic(&self, world: &Point3<f64>) -> (f64, f64, f64) {
        let (lat, lon, h) = self.ellipsoid().ecef_to_geodetic(world);
        (lat.to_degrees(), lon.to_degrees(), h)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors that can occur while placing an anchor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlacementError {
    #[error(transparent)]
    Srs(#[from] SrsError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Invalid scale factor: {0:?}")]
    InvalidScale([f64; 3]),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoplace_srs::StandardReprojector;
    use approx::assert_relative_eq;
    use geoplace_env::{ElevationTile, FlatElevation, NoElevation, TileElevation, TileKey};

    fn resolver(elevation: Arc<dyn ElevationSource>) -> PlacementResolver {
        PlacementResolver::new(&SpatialReference::wgs84(), Arc::new(StandardReprojector), elevation)
    }

    #[test]
    fn test_absolute_altitude_used_verbatim() {
        let r = resolver(Arc::new(FlatElevation(300.0)));
        let chicago =
            GeodeticPoint::new(r.map_srs().clone(), -87.65, 41.90, 1000.0, AltitudeMode::Absolute).unwrap();

        let placement = r.resolve(&chicago, None).unwrap();
        assert_eq!(placement.height, 1000.0);
        assert_eq!(placement.status, PlacementStatus::Resolved);
    }

    #[test]
    fn test_relative_altitude_adds_terrain() {
        let r = resolver(Arc::new(FlatElevation(300.0)));
        let p = GeodeticPoint::new(r.map_srs().clone(), 14.68, 50.0, 20.0, AltitudeMode::RelativeToGround)
            .unwrap();

        let placement = r.resolve(&p, None).unwrap();
        assert_relative_eq!(placement.height, 320.0);
        assert!(!placement.is_degraded());
    }

    #[test]
    fn test_up_follows_ellipsoid_normal() {
        let r = resolver(Arc::new(FlatElevation(0.0)));
        let p = GeodeticPoint::on_ground(r.map_srs().clone(), 116.42472, 39.90556).unwrap();
        let placement = r.resolve(&p, None).unwrap();

        let (lat, lon) = radians_from_degrees(39.90556, 116.42472);
        let normal = r.ellipsoid().surface_normal(lat, lon);
        assert!(placement.transform.frame().up().angle(&normal) < 1e-6);
    }

    #[test]
    fn test_world_round_trip() {
        let r = resolver(Arc::new(FlatElevation(0.0)));
        let p = GeodeticPoint::new(r.map_srs().clone(), 121.0, 38.0, 50_000.0, AltitudeMode::Absolute).unwrap();
        let placement = r.resolve(&p, None).unwrap();

        let (lat, lon, h) = r.world_to_geodetic(&placement.anchor());
        assert_relative_eq!(lat, 38.0, epsilon = 1e-9);
        assert_relative_eq!(lon, 121.0, epsilon = 1e-9);
        assert_relative_eq!(h, 50_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_resolve_is_bit_identical() {
        let r = resolver(Arc::new(FlatElevation(12.0)));
        let p = GeodeticPoint::on_ground(r.map_srs().clone(), -74.00, 40.71).unwrap();
        let a = r.resolve(&p, Some(Vector3::new(2.0, 2.0, 2.0))).unwrap();
        let b = r.resolve(&p, Some(Vector3::new(2.0, 2.0, 2.0))).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.transform.matrix(), b.transform.matrix());
    }

    #[test]
    fn test_pre_scale_keeps_origin_and_scales_axes() {
        let r = resolver(Arc::new(FlatElevation(0.0)));
        let p = GeodeticPoint::on_ground(r.map_srs().clone(), 116.0, 40.0).unwrap();
        let placement = r.resolve(&p, Some(Vector3::new(10_000.0, 10_000.0, 10_000.0))).unwrap();
        let transform = &placement.transform;

        assert_relative_eq!(transform.transform_point(&Point3::origin()), transform.origin(), epsilon = 1e-6);

        // One model unit up is 10 km along the normal
        let top = transform.transform_point(&Point3::new(0.0, 0.0, 1.0));
        let (_, _, h) = r.world_to_geodetic(&top);
        assert_relative_eq!(h, 10_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_degenerate_scale() {
        let r = resolver(Arc::new(FlatElevation(0.0)));
        let p = GeodeticPoint::on_ground(r.map_srs().clone(), 0.0, 0.0).unwrap();
        assert!(matches!(
            r.resolve(&p, Some(Vector3::new(1.0, 0.0, 1.0))),
            Err(PlacementError::InvalidScale(_))
        ));
    }

    #[test]
    fn test_antimeridian_west_edge_is_normalized() {
        let r = resolver(Arc::new(FlatElevation(0.0)));
        let p = GeodeticPoint::on_ground(r.map_srs().clone(), -180.0, 0.0).unwrap();
        let placement = r.resolve(&p, None).unwrap();
        assert_eq!(placement.longitude, 180.0);
    }

    #[test]
    fn test_reprojects_mercator_points() {
        let r = resolver(Arc::new(FlatElevation(0.0)));
        let mercator = SpatialReference::spherical_mercator();
        let p = GeodeticPoint::new(mercator, 0.0, 0.0, 5.0, AltitudeMode::Absolute).unwrap();
        let placement = r.resolve(&p, None).unwrap();
        assert_relative_eq!(placement.latitude, 0.0, epsilon = 1e-12);
        assert_relative_eq!(placement.anchor().x, 6_378_142.0, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_elevation_degrades_then_refreshes() {
        let terrain = Arc::new(TileElevation::new(1.0).unwrap());
        let r = resolver(terrain.clone());
        let ny = GeodeticPoint::on_ground(r.map_srs().clone(), -74.00, 40.71).unwrap();

        let mut placement = r.resolve(&ny, None).unwrap();
        assert_eq!(placement.status, PlacementStatus::Degraded);
        assert_eq!(placement.height, 0.0);
        let (_, _, h) = r.world_to_geodetic(&placement.anchor());
        assert_relative_eq!(h, 0.0, epsilon = 1e-6);

        // Still no data: nothing changes
        assert!(!r.refresh(&ny, None, &mut placement).unwrap());

        let key = TileKey::containing(40.71, -74.00, 1.0);
        terrain.insert_tile(ElevationTile::from_fn(key, 1.0, 2, |_, _| 35.0).unwrap());

        assert!(r.refresh(&ny, None, &mut placement).unwrap());
        assert_eq!(placement.status, PlacementStatus::Resolved);
        assert_relative_eq!(placement.height, 35.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_elevation_with_offset_keeps_offset() {
        let r = resolver(Arc::new(NoElevation));
        let p = GeodeticPoint::new(r.map_srs().clone(), 10.0, 10.0, 75.0, AltitudeMode::RelativeToGround)
            .unwrap();
        let placement = r.resolve(&p, None).unwrap();
        assert!(placement.is_degraded());
        assert_eq!(placement.height, 75.0);
    }

    #[test]
    fn test_incompatible_srs_is_an_error() {
        let r = resolver(Arc::new(FlatElevation(0.0)));
        let sphere = Arc::new(SpatialReference::new(
            "sphere",
            crate::geoplace_srs::SrsKind::Geographic,
            Ellipsoid::sphere(6_371_000.0).unwrap(),
        ));
        let p = GeodeticPoint::on_ground(sphere, 1.0, 1.0).unwrap();
        assert!(matches!(r.resolve(&p, None), Err(PlacementError::Srs(SrsError::Reprojection { .. }))));
    }
}
