use serde::{Deserialize, Serialize};

/// Search phase that ran out of attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    ZFast,
    ZSlow,
    XyRaster,
    XyPlane,
    Star,
    CrossX,
    CrossY,
    ZigZag,
    ZigZagCross,
}

impl std::fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchPhase::ZFast => "fast Z approach",
            SearchPhase::ZSlow => "slow Z approach",
            SearchPhase::XyRaster => "XY raster",
            SearchPhase::XyPlane => "XY plane search",
            SearchPhase::Star => "star refinement",
            SearchPhase::CrossX => "cross refinement in X",
            SearchPhase::CrossY => "cross refinement in Y",
            SearchPhase::ZigZag => "zig-zag chord scan",
            SearchPhase::ZigZagCross => "zig-zag X cross",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("sensor not found during {phase}")]
    SensorNotFound { phase: SearchPhase },
}

impl ProbeError {
    pub(crate) fn not_found(phase: SearchPhase) -> Self {
        ProbeError::SensorNotFound { phase }
    }
}
