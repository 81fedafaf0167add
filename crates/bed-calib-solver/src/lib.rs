//! Bed skew and offset solver.
//!
//! Given the measured machine positions of 3 to 9 reference targets and their
//! nominal world positions, [`fit_skew_and_offset`] fits the rotation of each
//! machine axis plus a translation and classifies the result.
//!
//! ```
//! use bed_calib_core::BED_REF_POINTS_9;
//! use bed_calib_solver::{fit_skew_and_offset, SolverParams};
//!
//! let fit = fit_skew_and_offset(&BED_REF_POINTS_9, &BED_REF_POINTS_9, &SolverParams::unscaled(), 0)
//!     .expect("fit");
//! assert!(fit.skew_disabled);
//! ```

mod fit;
mod linear;
mod params;

pub use fit::{fit_skew_and_offset, PointResidual, SkewFit, SolverError, MAX_POINTS, MIN_POINTS};
pub use linear::gauss_seidel;
pub use params::SolverParams;
