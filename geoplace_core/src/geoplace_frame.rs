//! The "FRAME" Engine - East-North-Up tangent frames on a reference ellipsoid
//!
//! Anchors content to a curved planet. The local frame at a geodetic
//! position has its origin on the ellipsoid (plus height) and its axes
//! along East, North and the ellipsoid surface normal. The normal follows
//! the geodetic latitude, so away from the equator and the poles it is
//! NOT the direction from the planet's centre.

use nalgebra::{IsometryMatrix3, Matrix3, Matrix4, Point3, Rotation3, Translation3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// WGS84 semi-major axis in meters
pub const WGS84_SEMI_MAJOR: f64 = 6_378_137.0;

/// WGS84 inverse flattening
pub const WGS84_INVERSE_FLATTENING: f64 = 298.257_223_563;

/// Iteration cap for the ECEF to geodetic fixed point (converges in ~5)
const MAX_GEODETIC_ITERATIONS: usize = 16;

/// Convergence threshold for latitude in radians
const GEODETIC_TOLERANCE: f64 = 1e-14;

// ============================================================================
// ELLIPSOID
// ============================================================================

/// An oblate ellipsoid of revolution (a sphere when both axes are equal).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    semi_major: f64,
    semi_minor: f64,
}

impl Ellipsoid {
    /// Creates an ellipsoid from its semi-axes in meters.
    pub fn new(semi_major: f64, semi_minor: f64) -> Result<Self, FrameError> {
        let valid = semi_major.is_finite()
            && semi_minor.is_finite()
            && semi_minor > 0.0
            && semi_minor <= semi_major;
        if !valid {
            return Err(FrameError::InvalidEllipsoid { semi_major, semi_minor });
        }
        Ok(Self { semi_major, semi_minor })
    }

    /// Creates an ellipsoid from its semi-major axis and inverse flattening.
    pub fn from_flattening(semi_major: f64, inverse_flattening: f64) -> Result<Self, FrameError> {
        Self::new(semi_major, semi_major * (1.0 - 1.0 / inverse_flattening))
    }

    /// The WGS84 ellipsoid.
    pub fn wgs84() -> Self {
        Self {
            semi_major: WGS84_SEMI_MAJOR,
            semi_minor: WGS84_SEMI_MAJOR * (1.0 - 1.0 / WGS84_INVERSE_FLATTENING),
        }
    }

    /// A sphere of the given radius.
    pub fn sphere(radius: f64) -> Result<Self, FrameError> {
        Self::new(radius, radius)
    }

    pub fn semi_major(&self) -> f64 {
        self.semi_major
    }

    pub fn semi_minor(&self) -> f64 {
        self.semi_minor
    }

    /// First eccentricity squared: 1 - b²/a²
    pub fn eccentricity_squared(&self) -> f64 {
        1.0 - (self.semi_minor * self.semi_minor) / (self.semi_major * self.semi_major)
    }

    /// Radius of curvature in the prime vertical at a geodetic latitude.
    pub fn prime_vertical_radius(&self, latitude: f64) -> f64 {
        let sin_lat = latitude.sin();
        self.semi_major / (1.0 - self.eccentricity_squared() * sin_lat * sin_lat).sqrt()
    }

    /// Unit surface normal at a geodetic latitude/longitude (radians).
    pub fn surface_normal(&self, latitude: f64, longitude: f64) -> Vector3<f64> {
        let (sin_lat, cos_lat) = latitude.sin_cos();
        let (sin_lon, cos_lon) = longitude.sin_cos();
        Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }

    /// Converts geodetic (radians, meters) to Earth-Centered Earth-Fixed meters.
    pub fn geodetic_to_ecef(&self, latitude: f64, longitude: f64, height: f64) -> Point3<f64> {
        let (sin_lat, cos_lat) = latitude.sin_cos();
        let (sin_lon, cos_lon) = longitude.sin_cos();
        let n = self.prime_vertical_radius(latitude);
        Point3::new(
            (n + height) * cos_lat * cos_lon,
            (n + height) * cos_lat * sin_lon,
            (n * (1.0 - self.eccentricity_squared()) + height) * sin_lat,
        )
    }

    /// Converts ECEF meters back to geodetic (latitude, longitude, height).
    ///
    /// Longitude is returned in (-π, π].
    pub fn ecef_to_geodetic(&self, ecef: &Point3<f64>) -> (f64, f64, f64) {
        let e2 = self.eccentricity_squared();
        let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();

        let mut longitude = if p > 0.0 { ecef.y.atan2(ecef.x) } else { 0.0 };
        if longitude <= -PI {
            longitude += 2.0 * PI;
        }

        // Fixed point on tan(φ) = (z + e² N sin φ) / p; stable at the poles
        let mut latitude = ecef.z.atan2(p * (1.0 - e2));
        for _ in 0..MAX_GEODETIC_ITERATIONS {
            let n = self.prime_vertical_radius(latitude);
            let next = (ecef.z + e2 * n * latitude.sin()).atan2(p);
            let converged = (next - latitude).abs() < GEODETIC_TOLERANCE;
            latitude = next;
            if converged {
                break;
            }
        }

        let (sin_lat, cos_lat) = latitude.sin_cos();
        let height = p * cos_lat + ecef.z * sin_lat
            - self.semi_major * (1.0 - e2 * sin_lat * sin_lat).sqrt();

        (latitude, longitude, height)
    }

    /// Computes the local East-North-Up frame at a geodetic position.
    ///
    /// # Arguments
    /// * `latitude` - Geodetic latitude in radians, within [-π/2, π/2]
    /// * `longitude` - Longitude in radians, within (-π, π]
    /// * `height` - Meters above the ellipsoid
    ///
    /// # Errors
    /// [`FrameError::InvalidCoordinate`] for out-of-domain or non-finite input.
    /// Values are never clamped.
    pub fn compute_local_to_world(
        &self,
        latitude: f64,
        longitude: f64,
        height: f64,
    ) -> Result<LocalFrame, FrameError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && height.is_finite()
            && (-FRAC_PI_2..=FRAC_PI_2).contains(&latitude)
            && longitude > -PI
            && longitude <= PI;
        if !valid {
            return Err(FrameError::InvalidCoordinate { latitude, longitude, height });
        }

        let (sin_lat, cos_lat) = latitude.sin_cos();
        let (sin_lon, cos_lon) = longitude.sin_cos();

        let east = Vector3::new(-sin_lon, cos_lon, 0.0);
        let up = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
        let north = up.cross(&east);

        let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[east, north, up]));
        let origin = self.geodetic_to_ecef(latitude, longitude, height);

        Ok(LocalFrame {
            isometry: IsometryMatrix3::from_parts(Translation3::from(origin.coords), rotation),
        })
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// Converts a geographic position in degrees to radians.
///
/// The domain endpoints (±90°, 180°) map exactly onto ±π/2 and π so that
/// they pass the frame resolver's domain check.
pub fn radians_from_degrees(latitude_deg: f64, longitude_deg: f64) -> (f64, f64) {
    let latitude = if latitude_deg == 90.0 {
        FRAC_PI_2
    } else if latitude_deg == -90.0 {
        -FRAC_PI_2
    } else {
        latitude_deg.to_radians()
    };
    let longitude = if longitude_deg == 180.0 { PI } else { longitude_deg.to_radians() };
    (latitude, longitude)
}

// ============================================================================
// LOCAL FRAME
// ============================================================================

/// Rigid transform from a local ENU frame to the planet's world (ECEF) frame.
///
/// Local +X is East, +Y is North, +Z is Up (the ellipsoid normal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    isometry: IsometryMatrix3<f64>,
}

impl LocalFrame {
    /// World position of the local origin.
    pub fn origin(&self) -> Point3<f64> {
        Point3::from(self.isometry.translation.vector)
    }

    pub fn east(&self) -> Vector3<f64> {
        self.isometry.rotation.matrix().column(0).into_owned()
    }

    pub fn north(&self) -> Vector3<f64> {
        self.isometry.rotation.matrix().column(1).into_owned()
    }

    pub fn up(&self) -> Vector3<f64> {
        self.isometry.rotation.matrix().column(2).into_owned()
    }

    /// The underlying rigid transform.
    pub fn isometry(&self) -> &IsometryMatrix3<f64> {
        &self.isometry
    }

    /// Homogeneous 4×4 local-to-world matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.isometry.to_homogeneous()
    }

    /// Maps a point in local ENU meters to world coordinates.
    pub fn local_to_world(&self, local: &Point3<f64>) -> Point3<f64> {
        self.isometry.transform_point(local)
    }

    /// Maps a world point into local ENU meters.
    pub fn world_to_local(&self, world: &Point3<f64>) -> Point3<f64> {
        self.isometry.inverse_transform_point(world)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised by the frame resolver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid coordinate: lat={latitude} rad, lon={longitude} rad, height={height} m")]
    InvalidCoordinate {
        latitude: f64,
        longitude: f64,
        height: f64,
    },

    #[error("Invalid ellipsoid: semi-major={semi_major} m, semi-minor={semi_minor} m")]
    InvalidEllipsoid { semi_major: f64, semi_minor: f64 },
}

// ============================================================================
// TESTS
// ============================================================================
