use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Software travel limits of the motion stages, in machine coordinates (mm).
///
/// `y_min` is the lowest Y the calibration is allowed to reach. The front
/// row of reference targets sits close to it, which is why some searches
/// report a point as "far" instead of failing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineLimits {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
    pub z_min: f32,
}

impl Default for MachineLimits {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 250.0,
            y_min: -4.0,
            y_max: 210.0,
            z_min: 0.0,
        }
    }
}

impl MachineLimits {
    #[inline]
    pub fn clamp_x(&self, x: f32) -> f32 {
        x.clamp(self.x_min, self.x_max)
    }

    #[inline]
    pub fn clamp_y(&self, y: f32) -> f32 {
        y.clamp(self.y_min, self.y_max)
    }

    /// Clamp the XY part of a target, leaving Z untouched.
    #[inline]
    pub fn clamp_xy(&self, p: Point3<f32>) -> Point3<f32> {
        Point3::new(self.clamp_x(p.x), self.clamp_y(p.y), p.z)
    }

    /// Parking position used after a successful refinement.
    pub fn park_xy(&self) -> Point2<f32> {
        Point2::new(self.x_min + 0.2, self.y_min + 0.2)
    }
}

/// Feed rates in mm/s.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feedrates {
    pub xy: f32,
    pub z: f32,
}

impl Default for Feedrates {
    fn default() -> Self {
        Self {
            xy: 3000.0 / 60.0,
            z: 800.0 / 60.0,
        }
    }
}
