use bed_calib_core::{GeometryError, StorageError};
use bed_calib_probe::ProbeError;
use bed_calib_solver::SolverError;

/// Why a calibration run was rolled back.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("reference point {}: {source}", .index + 1)]
    SensorNotFound {
        index: usize,
        #[source]
        source: ProbeError,
    },
    #[error("fitted correction rejected: {0}")]
    GeometryInvalid(#[from] GeometryError),
    #[error("fit residual {max_error:.3} mm exceeds the point tolerance")]
    ResidualTooLarge { max_error: f32 },
    #[error("extreme span of the Z samples: {span:.3} mm")]
    ZSpanTooLarge { span: f32 },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl CalibrationError {
    pub(crate) fn not_found(index: usize) -> impl FnOnce(ProbeError) -> Self {
        move |source| CalibrationError::SensorNotFound { index, source }
    }
}
