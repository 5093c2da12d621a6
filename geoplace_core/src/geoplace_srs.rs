//! Spatial references, geodetic points and SRS conversion.
//!
//! A [`SpatialReference`] is immutable and shared through `Arc` by every
//! point that uses it. A [`GeodeticPoint`] is validated once at
//! construction and never mutated afterwards.

use crate::geoplace_frame::{radians_from_degrees, Ellipsoid};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Latitude limit of the spherical mercator square, in degrees
pub const MERCATOR_MAX_LATITUDE: f64 = 85.051_128_779_806_59;

// ============================================================================
// SPATIAL REFERENCE
// ============================================================================

/// The coordinate system family of a spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SrsKind {
    /// x = longitude°, y = latitude°, z = height (m)
    Geographic,

    /// x, y = spherical mercator meters on the semi-major axis, z = height (m)
    SphericalMercator,

    /// x, y, z = Earth-Centered Earth-Fixed meters
    Geocentric,
}

/// A named coordinate system and its ellipsoid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialReference {
    name: String,
    kind: SrsKind,
    ellipsoid: Ellipsoid,
}

impl SpatialReference {
    /// Creates a spatial reference.
    pub fn new(name: impl Into<String>, kind: SrsKind, ellipsoid: Ellipsoid) -> Self {
        Self {
            name: name.into(),
            kind,
            ellipsoid,
        }
    }

    /// Geographic WGS84 (lon/lat degrees).
    pub fn wgs84() -> Arc<Self> {
        Arc::new(Self::new("wgs84", SrsKind::Geographic, Ellipsoid::wgs84()))
    }

    /// Spherical mercator on the WGS84 semi-major axis.
    pub fn spherical_mercator() -> Arc<Self> {
        Arc::new(Self::new("spherical-mercator", SrsKind::SphericalMercator, Ellipsoid::wgs84()))
    }

    /// WGS84 geocentric (ECEF).
    pub fn geocentric() -> Arc<Self> {
        Arc::new(Self::new("wgs84-geocentric", SrsKind::Geocentric, Ellipsoid::wgs84()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SrsKind {
        self.kind
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn is_geographic(&self) -> bool {
        self.kind == SrsKind::Geographic
    }

    /// The geographic SRS on the same ellipsoid.
    pub fn geographic(&self) -> SpatialReference {
        if self.is_geographic() {
            return self.clone();
        }
        Self::new(format!("{} (geographic)", self.name), SrsKind::Geographic, self.ellipsoid)
    }

    /// Same kind on the same ellipsoid; names are ignored.
    pub fn is_equivalent_to(&self, other: &SpatialReference) -> bool {
        self.kind == other.kind && self.ellipsoid == other.ellipsoid
    }

    /// Checks that (x, y, z) lies in this SRS' domain.
    pub fn validate(&self, x: f64, y: f64, z: f64) -> Result<(), SrsError> {
        let finite = x.is_finite() && y.is_finite() && z.is_finite();
        let in_domain = match self.kind {
            SrsKind::Geographic => (-180.0..=180.0).contains(&x) && (-90.0..=90.0).contains(&y),
            SrsKind::SphericalMercator => {
                let half_extent = PI * self.ellipsoid.semi_major();
                x.abs() <= half_extent && y.abs() <= half_extent
            }
            SrsKind::Geocentric => true,
        };
        if finite && in_domain {
            Ok(())
        } else {
            Err(SrsError::InvalidCoordinate {
                srs: self.name.clone(),
                x,
                y,
                z,
            })
        }
    }
}

// ============================================================================
// GEODETIC POINT
// ============================================================================

/// How the z coordinate of a point is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AltitudeMode {
    /// z is added to the terrain height under the point
    #[default]
    RelativeToGround,

    /// z is height above the ellipsoid
    Absolute,
}

/// An immutable position in a spatial reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodeticPoint {
    srs: Arc<SpatialReference>,
    x: f64,
    y: f64,
    z: f64,
    altitude_mode: AltitudeMode,
}

impl GeodeticPoint {
    /// Creates a point, rejecting coordinates outside the SRS' domain.
    pub fn new(
        srs: Arc<SpatialReference>,
        x: f64,
        y: f64,
        z: f64,
        altitude_mode: AltitudeMode,
    ) -> Result<Self, SrsError> {
        srs.validate(x, y, z)?;
        Ok(Self {
            srs,
            x,
            y,
            z,
            altitude_mode,
        })
    }

    /// A ground-relative point at zero offset.
    pub fn on_ground(srs: Arc<SpatialReference>, x: f64, y: f64) -> Result<Self, SrsError> {
        Self::new(srs, x, y, 0.0, AltitudeMode::RelativeToGround)
    }

    pub fn srs(&self) -> &Arc<SpatialReference> {
        &self.srs
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn altitude_mode(&self) -> AltitudeMode {
        self.altitude_mode
    }
}

// ============================================================================
// REPROJECTION
// ============================================================================

/// SRS conversion collaborator.
pub trait Reprojector: Send + Sync {
    /// Converts `point` into `target`, keeping its altitude mode.
    fn reproject(
        &self,
        point: &GeodeticPoint,
        target: &Arc<SpatialReference>,
    ) -> Result<GeodeticPoint, SrsError>;
}

/// Converts between geographic, spherical mercator and geocentric systems
/// that share an ellipsoid.
///
/// Datum transformations are not supported: a pair of SRSs on different
/// ellipsoids is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardReprojector;

impl StandardReprojector {
    /// (lat°, lon°, h) of a point on its own ellipsoid.
    fn to_geodetic(point: &GeodeticPoint) -> (f64, f64, f64) {
        let a = point.srs.ellipsoid().semi_major();
        match point.srs.kind() {
            SrsKind::Geographic => (point.y, point.x, point.z),
            SrsKind::SphericalMercator => {
                let lon = (point.x / a).to_degrees();
                let lat = (point.y / a).sinh().atan().to_degrees();
                (lat, lon, point.z)
            }
            SrsKind::Geocentric => {
                let ecef = nalgebra::Point3::new(point.x, point.y, point.z);
                let (lat, lon, h) = point.srs.ellipsoid().ecef_to_geodetic(&ecef);
                (lat.to_degrees(), lon.to_degrees(), h)
            }
        }
    }
}

impl Reprojector for StandardReprojector {
    fn reproject(
        &self,
        point: &GeodeticPoint,
        target: &Arc<SpatialReference>,
    ) -> Result<GeodeticPoint, SrsError> {
        if point.srs.is_equivalent_to(target) {
            return GeodeticPoint::new(Arc::clone(target), point.x, point.y, point.z, point.altitude_mode);
        }

        let reject = |reason: &str| SrsError::Reprojection {
            from: point.srs.name().to_string(),
            to: target.name().to_string(),
            reason: reason.to_string(),
        };

        if point.srs.ellipsoid() != target.ellipsoid() {
            return Err(reject("datum transformation between ellipsoids is not supported"));
        }

        let (lat, lon, h) = Self::to_geodetic(point);
        let (x, y, z) = match target.kind() {
            SrsKind::Geographic => (lon, lat, h),
            SrsKind::SphericalMercator => {
                if lat.abs() > MERCATOR_MAX_LATITUDE {
                    return Err(reject("latitude outside the mercator square"));
                }
                let a = target.ellipsoid().semi_major();
                let x = a * lon.to_radians();
                let y = a * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
                (x, y, h)
            }
            SrsKind::Geocentric => {
                let (lat_rad, lon_rad) = radians_from_degrees(lat, lon);
                let p = target.ellipsoid().geodetic_to_ecef(lat_rad, lon_rad, h);
                (p.x, p.y, p.z)
            }
        };

        GeodeticPoint::new(Arc::clone(target), x, y, z, point.altitude_mode)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised for points and SRS conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SrsError {
    #[error("Invalid coordinate ({x}, {y}, {z}) for SRS '{srs}'")]
    InvalidCoordinate { srs: String, x: f64, y: f64, z: f64 },

    #[error("Cannot reproject from '{from}' to '{to}': {reason}")]
    Reprojection { from: String, to: String, reason: String },
}
