//! Gauss-Newton fit of rotation, skew and offset.
//!
//! The model maps a measured (machine) point onto its reference (world)
//! target:
//!
//! ```text
//! x_t = cos(a1)·Sx·x_m − sin(a2)·Sy·y_m + cx
//! y_t = sin(a1)·Sx·x_m + cos(a2)·Sy·y_m + cy
//! ```
//!
//! `a1`, `a2` are the rotations of the machine X and Y axes, `Sx`, `Sy` the
//! fixed axis scale. The fitted map is inverted before it is returned, so
//! [`SkewFit::correction`] is world-to-machine.

use bed_calib_core::{AffineCorrection, CalibrationResult};
use nalgebra::{Matrix2, Matrix4, Point2, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use crate::linear::gauss_seidel;
use crate::params::SolverParams;

#[cfg(feature = "tracing")]
use tracing::instrument;

pub const MIN_POINTS: usize = 3;
pub const MAX_POINTS: usize = 9;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("{measured} measured points for {targets} targets")]
    CountMismatch { measured: usize, targets: usize },
    #[error("{0} points given, the fit needs {MIN_POINTS}..={MAX_POINTS}")]
    UnsupportedCount(usize),
    #[error("normal equations are degenerate")]
    Degenerate,
}

/// Reprojection error of one point under the fitted (measured to target) map.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointResidual {
    pub index: usize,
    pub dx: f32,
    pub dy: f32,
    pub within_tolerance: bool,
}

impl PointResidual {
    #[inline]
    pub fn norm(&self) -> f32 {
        self.dx.hypot(self.dy)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkewFit {
    /// World-to-machine correction, snapped to pure scale when skew is negligible.
    pub correction: AffineCorrection,
    /// Fitted rotation of the machine X axis, radians.
    pub angle_x: f64,
    /// Fitted rotation of the machine Y axis, radians.
    pub angle_y: f64,
    pub result: CalibrationResult,
    /// Whether the skew part was dropped from the correction.
    pub skew_disabled: bool,
    pub residuals: Vec<PointResidual>,
}

impl SkewFit {
    pub fn angles_deg(&self) -> [f64; 2] {
        [self.angle_x.to_degrees(), self.angle_y.to_degrees()]
    }

    pub fn max_error(&self) -> f32 {
        self.residuals
            .iter()
            .map(PointResidual::norm)
            .fold(0.0, f32::max)
    }
}

struct Model {
    c1: f64,
    s1: f64,
    c2: f64,
    s2: f64,
}

impl Model {
    fn new(a1: f64, a2: f64, scale: [f64; 2]) -> Self {
        Self {
            c1: a1.cos() * scale[0],
            s1: a1.sin() * scale[0],
            c2: a2.cos() * scale[1],
            s2: a2.sin() * scale[1],
        }
    }

    #[inline]
    fn residual(&self, m: &Point2<f64>, t: &Point2<f64>, center: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            self.c1 * m.x - self.s2 * m.y + center.x - t.x,
            self.s1 * m.x + self.c2 * m.y + center.y - t.y,
        )
    }

    /// Jacobian rows of the X and Y residual w.r.t. `(cx, cy, a1, a2)`.
    #[inline]
    fn jacobian(&self, m: &Point2<f64>) -> (Vector4<f64>, Vector4<f64>) {
        (
            Vector4::new(1.0, 0.0, -self.s1 * m.x, -self.c2 * m.y),
            Vector4::new(0.0, 1.0, self.c1 * m.x, -self.s2 * m.y),
        )
    }
}

fn to_f64(p: &Point2<f32>) -> Point2<f64> {
    Point2::new(p.x as f64, p.y as f64)
}

/// Fit the bed correction to `measured` points probed for `targets`.
///
/// Runs a fixed number of Gauss-Newton iterations, each solving the 4x4
/// normal equations with fixed Gauss-Seidel sweeps. The first
/// `params.first_row_points` points have a reduced Y weight and looser
/// tolerances. `verbosity` only controls extra logging.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(measured, targets, params), fields(points = measured.len()))
)]
pub fn fit_skew_and_offset(
    measured: &[Point2<f32>],
    targets: &[Point2<f32>],
    params: &SolverParams,
    verbosity: i8,
) -> Result<SkewFit, SolverError> {
    if measured.len() != targets.len() {
        return Err(SolverError::CountMismatch {
            measured: measured.len(),
            targets: targets.len(),
        });
    }
    if !(MIN_POINTS..=MAX_POINTS).contains(&measured.len()) {
        return Err(SolverError::UnsupportedCount(measured.len()));
    }

    let meas: Vec<Point2<f64>> = measured.iter().map(to_f64).collect();
    let tgt: Vec<Point2<f64>> = targets.iter().map(to_f64).collect();

    if verbosity >= 10 {
        for (i, (m, t)) in meas.iter().zip(&tgt).enumerate() {
            log::debug!(
                "point #{i} measured: ({:.5}, {:.5}); target: ({:.5}, {:.5}), error: {:.5}",
                m.x,
                m.y,
                t.x,
                t.y,
                (t - m).norm()
            );
        }
    }

    let mut center = Vector2::<f64>::zeros();
    let mut a1 = 0.0_f64;
    let mut a2 = 0.0_f64;

    for iter in 0..params.gauss_newton_iterations {
        let model = Model::new(a1, a2, params.axis_scale);
        let mut jtj = Matrix4::<f64>::zeros();
        let mut jtf = Vector4::<f64>::zeros();
        for (i, (m, t)) in meas.iter().zip(&tgt).enumerate() {
            let f = model.residual(m, t, &center);
            let (jx, jy) = model.jacobian(m);
            let w = params.weight_y(i);
            jtj += jx * jx.transpose() + jy * jy.transpose() * w;
            jtf += jx * f.x + jy * (f.y * w);
        }

        let h = gauss_seidel(&jtj, &(-jtf), params.gauss_seidel_sweeps)
            .ok_or(SolverError::Degenerate)?;
        center.x += h[0];
        center.y += h[1];
        a1 += h[2];
        a2 += h[3];

        if verbosity >= 20 {
            log::trace!(
                "iteration {iter}: step ({:.5}, {:.5}, {:.5}, {:.5}), center ({:.5}, {:.5}), angles ({:.5}, {:.5}) deg",
                h[0],
                h[1],
                h[2],
                h[3],
                center.x,
                center.y,
                a1.to_degrees(),
                a2.to_degrees()
            );
        }
    }

    let mild = params.skew_mild_deg.to_radians();
    let extreme = params.skew_extreme_deg.to_radians();
    let mut result = CalibrationResult::Perfect;
    let diff = (a2 - a1).abs();
    if diff > mild {
        result = if diff > extreme {
            CalibrationResult::ExtremeSkew
        } else {
            CalibrationResult::MildSkew
        };
    }
    if a1.abs() > extreme || a2.abs() > extreme {
        result = CalibrationResult::ExtremeSkew;
    }

    if verbosity >= 1 {
        log::info!(
            "correction angles: {:.5}, {:.5} deg",
            a1.to_degrees(),
            a2.to_degrees()
        );
    }

    let model = Model::new(a1, a2, params.axis_scale);
    let mut residuals = Vec::with_capacity(meas.len());
    for (i, (m, t)) in meas.iter().zip(&tgt).enumerate() {
        let f = model.residual(m, t, &center);
        let ok = if i < params.first_row_points {
            f.x.abs() <= params.max_error_first_row_x && f.y.abs() <= params.max_error_first_row_y
        } else {
            f.norm() <= params.max_error_euclidean
        };
        if !ok {
            result = CalibrationResult::Failed;
        }
        if verbosity >= 10 {
            log::debug!(
                "point #{i} corrected: ({:.5}, {:.5}); target: ({:.5}, {:.5}), error: {:.5}",
                t.x + f.x,
                t.y + f.y,
                t.x,
                t.y,
                f.norm()
            );
        }
        residuals.push(PointResidual {
            index: i,
            dx: f.x as f32,
            dy: f.y as f32,
            within_tolerance: ok,
        });
    }

    let skew_disabled = result == CalibrationResult::Perfect && a1.abs() < mild && a2.abs() < mild;
    let fitted = if skew_disabled {
        if verbosity > 0 {
            log::info!("very little skew detected, disabling skew correction");
        }
        Matrix2::new(params.axis_scale[0], 0.0, 0.0, params.axis_scale[1])
    } else {
        Matrix2::new(model.c1, -model.s2, model.s1, model.c2)
    };

    let d = fitted.determinant();
    if d.abs() < 1e-12 {
        return Err(SolverError::Degenerate);
    }
    let inv = Matrix2::new(fitted[(1, 1)], -fitted[(0, 1)], -fitted[(1, 0)], fitted[(0, 0)]) / d;
    let center_inv = -(inv * center);
    let correction = AffineCorrection::from_matrix(inv.cast::<f32>(), center_inv.cast::<f32>());

    if verbosity >= 1 {
        log::info!(
            "X vector {:.5}, {:.5}; Y vector {:.5}, {:.5}; center {:.5}, {:.5}",
            correction.vec_x.x,
            correction.vec_x.y,
            correction.vec_y.x,
            correction.vec_y.y,
            correction.center.x,
            correction.center.y
        );
    }
    if verbosity >= 2 {
        for (i, (m, t)) in measured.iter().zip(targets).enumerate() {
            let p = correction.apply(*t);
            log::info!(
                "point #{i} measured: ({:.5}, {:.5}); target corrected: ({:.5}, {:.5}), difference {:.5}",
                m.x,
                m.y,
                p.x,
                p.y,
                (p - m).norm()
            );
        }
    }

    Ok(SkewFit {
        correction,
        angle_x: a1,
        angle_y: a2,
        result,
        skew_disabled,
        residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bed_calib_core::{BED_REF_POINTS_4, BED_REF_POINTS_9};

    #[test]
    fn rejects_mismatched_counts() {
        let err = fit_skew_and_offset(
            &BED_REF_POINTS_9[..5],
            &BED_REF_POINTS_9,
            &SolverParams::default(),
            0,
        )
        .expect_err("mismatch");
        assert_eq!(
            err,
            SolverError::CountMismatch {
                measured: 5,
                targets: 9
            }
        );
    }

    #[test]
    fn rejects_too_few_points() {
        let err = fit_skew_and_offset(
            &BED_REF_POINTS_9[..2],
            &BED_REF_POINTS_9[..2],
            &SolverParams::default(),
            0,
        )
        .expect_err("too few");
        assert_eq!(err, SolverError::UnsupportedCount(2));
    }

    #[test]
    fn four_point_shift_is_recovered() {
        let measured: Vec<_> = BED_REF_POINTS_4
            .iter()
            .map(|p| Point2::new(p.x + 0.5, p.y + 0.3))
            .collect();
        let fit = fit_skew_and_offset(&measured, &BED_REF_POINTS_4, &SolverParams::unscaled(), 0)
            .expect("fit");
        assert_eq!(fit.result, CalibrationResult::Perfect);
        assert!(fit.skew_disabled);
        assert_abs_diff_eq!(fit.correction.center.x, 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(fit.correction.center.y, 0.3, epsilon = 1e-3);
    }

    #[test]
    fn default_scale_shrinks_correction() {
        let fit = fit_skew_and_offset(
            &BED_REF_POINTS_9,
            &BED_REF_POINTS_9,
            &SolverParams::default(),
            0,
        )
        .expect("fit");
        assert_ne!(fit.result, CalibrationResult::Failed);
        assert_abs_diff_eq!(fit.correction.vec_x.x, 250.0 / 250.5, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.correction.vec_y.y, 250.0 / 250.5, epsilon = 1e-4);
        assert!(fit.max_error() < 0.8);
    }
}
