use bed_calib_core::{Feedrates, MachineLimits};
use bed_calib_probe::SearchParams;
use bed_calib_solver::SolverParams;
use serde::{Deserialize, Serialize};

/// Parameters of the calibration procedures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    pub limits: MachineLimits,
    pub feedrates: Feedrates,
    pub solver: SolverParams,
    pub search: SearchParams,
    /// Travel height between reference points, mm.
    pub search_height: f32,
    /// Lift over the last trigger height before the next coarse point, mm.
    pub coarse_lift: f32,
    /// Successful refinements per reference point.
    pub refine_iterations: usize,
    /// Leading refinements excluded from the average.
    pub warmup_iterations: usize,
    /// Consecutive failed refinements that abort the run.
    pub max_consecutive_failures: usize,
    /// Z drop after a failed refinement, mm.
    pub retry_z_step: f32,
    /// Zig-zag attempts on the first coarse point.
    pub front_point_attempts: usize,
    /// Largest accepted spread of the sampled bed heights, mm.
    pub max_z_span: f32,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            limits: MachineLimits::default(),
            feedrates: Feedrates::default(),
            solver: SolverParams::default(),
            search: SearchParams::default(),
            search_height: 5.0,
            coarse_lift: 3.0,
            refine_iterations: 8,
            warmup_iterations: 4,
            max_consecutive_failures: 3,
            retry_z_step: 0.025,
            front_point_attempts: 4,
            max_z_span: 3.0,
        }
    }
}

impl CalibrationParams {
    /// Iteration count and the number of leading iterations to discard,
    /// adjusted so that at least one reading is averaged.
    pub(crate) fn refine_schedule(&self) -> (usize, usize) {
        let iterations = self.refine_iterations.max(1);
        (iterations, self.warmup_iterations.min(iterations - 1))
    }
}
