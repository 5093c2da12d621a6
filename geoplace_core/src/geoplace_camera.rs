//! Per-frame viewpoint: eye, target and a pinhole projection to pixels.
//!
//! Screen coordinates have their origin at the top-left corner with y
//! growing downwards.

use crate::geoplace_frame::{radians_from_degrees, Ellipsoid, FrameError};
use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Default vertical field of view (30°)
pub const DEFAULT_FOV_Y: f64 = std::f64::consts::FRAC_PI_6;

/// A projected point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    /// Pixels from the left edge
    pub x: f64,

    /// Pixels from the top edge
    pub y: f64,

    /// Distance along the view axis in scene units
    pub depth: f64,
}

/// A pinhole camera in world (ECEF) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    eye: Point3<f64>,
    target: Point3<f64>,
    up: Vector3<f64>,
    fov_y: f64,
    near: f64,
    width: u32,
    height: u32,
    view: Isometry3<f64>,
}

impl Camera {
    /// Creates a camera looking from `eye` at `target`.
    ///
    /// # Errors
    /// A zero-size viewport, a field of view outside (0, π), coincident
    /// eye and target, or an `up` parallel to the view direction.
    pub fn new(
        eye: Point3<f64>,
        target: Point3<f64>,
        up: Vector3<f64>,
        fov_y: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::EmptyViewport { width, height });
        }
        if !(fov_y > 0.0 && fov_y < std::f64::consts::PI) {
            return Err(CameraError::InvalidFieldOfView(fov_y));
        }
        let forward = target - eye;
        if forward.norm() <= f64::EPSILON || forward.cross(&up).norm() <= f64::EPSILON * forward.norm() {
            return Err(CameraError::DegenerateView);
        }

        Ok(Self {
            eye,
            target,
            up,
            fov_y,
            near: 1.0,
            width,
            height,
            view: Isometry3::look_at_rh(&eye, &target, &up),
        })
    }

    /// Camera `range` meters straight above a geodetic point, north up.
    pub fn look_at_geodetic(
        ellipsoid: &Ellipsoid,
        latitude_deg: f64,
        longitude_deg: f64,
        range: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, CameraError> {
        let (lat, lon) = radians_from_degrees(latitude_deg, longitude_deg);
        let frame = ellipsoid.compute_local_to_world(lat, lon, 0.0)?;
        let target = frame.origin();
        let eye = target + frame.up() * range;
        Self::new(eye, target, frame.north(), DEFAULT_FOV_Y, width, height)
    }

    /// Sets the near clip distance (points closer than this are not projected).
    pub fn with_near(mut self, near: f64) -> Self {
        self.near = near.max(0.0);
        self
    }

    pub fn eye(&self) -> Point3<f64> {
        self.eye
    }

    pub fn target(&self) -> Point3<f64> {
        self.target
    }

    pub fn up(&self) -> Vector3<f64> {
        self.up
    }

    pub fn fov_y(&self) -> f64 {
        self.fov_y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn distance_to(&self, world: &Point3<f64>) -> f64 {
        nalgebra::distance(&self.eye, world)
    }

    /// Projects a world point to the screen.
    ///
    /// Returns `None` for points behind the near plane; points in front
    /// but outside the viewport are still projected (see [`Camera::in_view`]).
    pub fn project(&self, world: &Point3<f64>) -> Option<ScreenPoint> {
        let view = self.view.transform_point(world);
        let depth = -view.z;
        if depth < self.near || !depth.is_finite() {
            return None;
        }

        let f = 1.0 / (0.5 * self.fov_y).tan();
        let ndc_x = f / self.aspect() * view.x / depth;
        let ndc_y = f * view.y / depth;

        Some(ScreenPoint {
            x: (ndc_x + 1.0) * 0.5 * self.width as f64,
            y: (1.0 - ndc_y) * 0.5 * self.height as f64,
            depth,
        })
    }

    /// True if a projected point lies inside the viewport.
    pub fn in_view(&self, point: &ScreenPoint) -> bool {
        point.x >= 0.0 && point.x <= self.width as f64 && point.y >= 0.0 && point.y <= self.height as f64
    }

    /// World size of one pixel at `distance` from the eye.
    pub fn pixel_size_at(&self, distance: f64) -> f64 {
        2.0 * distance * (0.5 * self.fov_y).tan() / self.height as f64
    }

    /// True if the ellipsoid hides `world` from the eye.
    ///
    /// Works in the ellipsoid's scaled space where it becomes the unit
    /// sphere; a point is hidden when it lies beyond the horizon cone.
    pub fn is_behind_horizon(&self, ellipsoid: &Ellipsoid, world: &Point3<f64>) -> bool {
        let scale = Vector3::new(
            1.0 / ellipsoid.semi_major(),
            1.0 / ellipsoid.semi_major(),
            1.0 / ellipsoid.semi_minor(),
        );
        let eye = self.eye.coords.component_mul(&scale);
        let horizon_sq = eye.norm_squared() - 1.0;
        if horizon_sq <= 0.0 {
            // Eye inside the ellipsoid
            return false;
        }

        let to_point = world.coords.component_mul(&scale) - eye;
        let along = -to_point.dot(&eye);
        along > horizon_sq && along * along / to_point.norm_squared() > horizon_sq
    }
}

/// Errors for camera setup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    #[error("Viewport must be non-empty, got {width}x{height}")]
    EmptyViewport { width: u32, height: u32 },

    #[error("Vertical field of view must be in (0, pi), got {0}")]
    InvalidFieldOfView(f64),

    #[error("Eye, target and up do not define a view")]
    DegenerateView,

    #[error(transparent)]
    Frame(#[from] FrameError),
}
