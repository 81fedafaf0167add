use serde::{Deserialize, Serialize};

/// Verdict of a calibration run.
///
/// Ordered from best to worst for the skew classes; `FrontLeftTooFar` and
/// `FrontRightTooFar` are accepted results that warn about a reference point
/// the sensor could not fully reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationResult {
    Perfect,
    MildSkew,
    ExtremeSkew,
    FrontLeftTooFar,
    FrontRightTooFar,
    Failed,
}

impl CalibrationResult {
    #[inline]
    pub fn is_failed(self) -> bool {
        self == CalibrationResult::Failed
    }
}

impl std::fmt::Display for CalibrationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CalibrationResult::Perfect => "perfect",
            CalibrationResult::MildSkew => "mild skew",
            CalibrationResult::ExtremeSkew => "extreme skew",
            CalibrationResult::FrontLeftTooFar => "front left point too far",
            CalibrationResult::FrontRightTooFar => "front right point too far",
            CalibrationResult::Failed => "failed",
        };
        f.write_str(s)
    }
}
