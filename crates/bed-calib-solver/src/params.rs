use serde::{Deserialize, Serialize};

/// Parameters of the skew/offset fit.
///
/// Iteration counts are fixed; the fit never checks for convergence so its
/// run time does not depend on the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Known mechanical stretch of the X and Y axes. Not fitted.
    pub axis_scale: [f64; 2],
    /// Weight of the Y residual of the first-row points.
    pub first_row_y_weight: f64,
    /// Number of leading points weighted as the first row.
    pub first_row_points: usize,
    pub gauss_newton_iterations: usize,
    pub gauss_seidel_sweeps: usize,
    /// Axis angle (degrees) above which skew is reported as mild.
    pub skew_mild_deg: f64,
    /// Axis angle (degrees) above which skew is reported as extreme.
    pub skew_extreme_deg: f64,
    /// Largest accepted Euclidean error of a point outside the first row (mm).
    pub max_error_euclidean: f64,
    /// Largest accepted X error of a first-row point (mm).
    pub max_error_first_row_x: f64,
    /// Largest accepted Y error of a first-row point (mm).
    pub max_error_first_row_y: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            axis_scale: [250.5 / 250.0, 250.5 / 250.0],
            first_row_y_weight: 0.2,
            first_row_points: bed_calib_core::FIRST_ROW_POINTS,
            gauss_newton_iterations: 100,
            gauss_seidel_sweeps: 100,
            skew_mild_deg: 0.12,
            skew_extreme_deg: 0.25,
            max_error_euclidean: 0.8,
            max_error_first_row_x: 0.8,
            max_error_first_row_y: 1.5,
        }
    }
}

impl SolverParams {
    /// Unit axis scale. Measured points equal to the targets then fit exactly.
    pub fn unscaled() -> Self {
        Self {
            axis_scale: [1.0, 1.0],
            ..Self::default()
        }
    }

    #[inline]
    pub(crate) fn weight_y(&self, index: usize) -> f64 {
        if index < self.first_row_points {
            self.first_row_y_weight
        } else {
            1.0
        }
    }
}
