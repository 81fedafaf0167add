use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Affine world-to-machine correction:
/// `machine = vec_x * x_world + vec_y * y_world + center`.
///
/// `vec_x` and `vec_y` are the columns of the 2x2 rotation/skew matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineCorrection {
    pub vec_x: Vector2<f32>,
    pub vec_y: Vector2<f32>,
    pub center: Vector2<f32>,
}

/// Bounds of the load-time validity gate.
pub struct CorrectionLimits {
    pub min_axis_len: f32,
    pub max_axis_len: f32,
    pub max_shift: f32,
    pub max_axis_dot: f32,
}

pub const CORRECTION_LIMITS: CorrectionLimits = CorrectionLimits {
    min_axis_len: 0.9,
    max_axis_len: 1.1,
    max_shift: 15.0,
    max_axis_dot: 0.1,
};

/// Reasons a correction is rejected.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("correction is not calibrated")]
    Unset,
    #[error("length of the X axis vector out of range ({len:.5})")]
    XAxisLength { len: f32 },
    #[error("length of the Y axis vector out of range ({len:.5})")]
    YAxisLength { len: f32 },
    #[error("shift of the zero point too large ({len:.5} mm)")]
    ShiftTooLarge { len: f32 },
    #[error("X and Y axes are not perpendicular (dot = {dot:.5})")]
    NotPerpendicular { dot: f32 },
    #[error("correction matrix is singular")]
    Singular,
}

impl AffineCorrection {
    pub const IDENTITY: AffineCorrection = AffineCorrection {
        vec_x: Vector2::new(1.0, 0.0),
        vec_y: Vector2::new(0.0, 1.0),
        center: Vector2::new(0.0, 0.0),
    };

    pub fn new(vec_x: Vector2<f32>, vec_y: Vector2<f32>, center: Vector2<f32>) -> Self {
        Self {
            vec_x,
            vec_y,
            center,
        }
    }

    pub fn from_matrix(m: Matrix2<f32>, center: Vector2<f32>) -> Self {
        Self::new(m.column(0).into_owned(), m.column(1).into_owned(), center)
    }

    /// The rotation/skew matrix with `vec_x`, `vec_y` as columns.
    #[inline]
    pub fn matrix(&self) -> Matrix2<f32> {
        Matrix2::from_columns(&[self.vec_x, self.vec_y])
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        Point2::from(self.vec_x * p.x + self.vec_y * p.y + self.center)
    }

    /// Invert the mapping, `None` when the matrix is singular.
    pub fn inverse(&self) -> Option<AffineCorrection> {
        let m = self.matrix();
        let det = m.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = Matrix2::new(m[(1, 1)], -m[(0, 1)], -m[(1, 0)], m[(0, 0)]) / det;
        Some(AffineCorrection::from_matrix(inv, -(inv * self.center)))
    }

    /// Load-time validity gate: near-unit axes, bounded shift, near-orthogonal axes.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let all = [
            self.vec_x.x,
            self.vec_x.y,
            self.vec_y.x,
            self.vec_y.y,
            self.center.x,
            self.center.y,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::Unset);
        }

        let lim = &CORRECTION_LIMITS;
        let len = self.vec_x.norm();
        if !(lim.min_axis_len..=lim.max_axis_len).contains(&len) {
            return Err(GeometryError::XAxisLength { len });
        }
        let len = self.vec_y.norm();
        if !(lim.min_axis_len..=lim.max_axis_len).contains(&len) {
            return Err(GeometryError::YAxisLength { len });
        }
        let len = self.center.norm();
        if len > lim.max_shift {
            return Err(GeometryError::ShiftTooLarge { len });
        }
        let dot = self.vec_x.dot(&self.vec_y);
        if dot.abs() > lim.max_axis_dot {
            return Err(GeometryError::NotPerpendicular { dot });
        }
        Ok(())
    }
}

impl Default for AffineCorrection {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rotated(deg: f32, scale: f32, center: Vector2<f32>) -> AffineCorrection {
        let (s, c) = deg.to_radians().sin_cos();
        AffineCorrection::new(
            Vector2::new(c, s) * scale,
            Vector2::new(-s, c) * scale,
            center,
        )
    }

    #[test]
    fn identity_passes_gate() {
        assert_eq!(AffineCorrection::IDENTITY.validate(), Ok(()));
    }

    #[test]
    fn long_axis_is_rejected() {
        let c = rotated(0.0, 1.5, Vector2::zeros());
        assert!(matches!(
            c.validate(),
            Err(GeometryError::XAxisLength { .. })
        ));
    }

    #[test]
    fn slightly_long_axis_is_accepted() {
        let c = rotated(0.3, 1.02, Vector2::new(0.4, -0.2));
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn large_shift_is_rejected() {
        let c = rotated(0.0, 1.0, Vector2::new(12.0, 10.0));
        assert!(matches!(
            c.validate(),
            Err(GeometryError::ShiftTooLarge { .. })
        ));
    }

    #[test]
    fn skewed_axes_are_rejected() {
        let c = AffineCorrection::new(
            Vector2::new(1.0, 0.0),
            Vector2::new(0.2, 0.98),
            Vector2::zeros(),
        );
        assert!(matches!(
            c.validate(),
            Err(GeometryError::NotPerpendicular { .. })
        ));
    }

    #[test]
    fn nan_reads_as_unset() {
        let mut c = AffineCorrection::IDENTITY;
        c.center.y = f32::NAN;
        assert_eq!(c.validate(), Err(GeometryError::Unset));
    }

    #[test]
    fn inverse_round_trips_points() {
        let c = rotated(0.4, 1.003, Vector2::new(1.5, -0.7));
        let inv = c.inverse().expect("invertible");
        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(12.0, -2.0),
            Point2::new(215.0, 194.0),
        ] {
            let back = inv.apply(c.apply(p));
            assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-3);
            assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-3);
        }
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let c = AffineCorrection::new(
            Vector2::new(1.0, 1.0),
            Vector2::new(2.0, 2.0),
            Vector2::zeros(),
        );
        assert!(c.inverse().is_none());
    }
}
