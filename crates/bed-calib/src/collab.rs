//! Collaborators the calibration procedures report to or write into.

use bed_calib_core::CalibrationResult;
use bed_calib_probe::ScanEdge;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Bed height grid filled by the refinement.
///
/// Cells are addressed on the logical 3x3 grid of reference targets, also
/// after [`MeshGrid::upsample`].
pub trait MeshGrid {
    /// Zero every sample and deactivate the grid.
    fn clear(&mut self);
    fn set_z(&mut self, col: usize, row: usize, z: f32);
    fn z(&self, col: usize, row: usize) -> f32;
    /// Interpolate the 3x3 samples onto the finer leveling grid.
    fn upsample(&mut self);
    fn set_active(&mut self, active: bool);
}

/// Liveness signal for long procedures.
pub trait Watchdog {
    fn refresh(&mut self);
}

/// Watchdog that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn refresh(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Procedure {
    Coarse,
    Refine,
    Scan,
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Procedure::Coarse => "coarse",
            Procedure::Refine => "refine",
            Procedure::Scan => "scan",
        })
    }
}

/// Progress of a calibration procedure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    Started {
        procedure: Procedure,
    },
    /// A reference point was measured (machine coordinates).
    PointFound {
        index: usize,
        position: Point3<f32>,
    },
    /// A trigger edge found by the diagnostic scan.
    Edge {
        index: usize,
        edge: ScanEdge,
    },
    Finished {
        procedure: Procedure,
        result: CalibrationResult,
    },
    ScanFinished {
        complete: bool,
    },
}

/// Receives progress. Purely observational.
pub trait StatusSink {
    fn report(&mut self, event: StatusEvent);
}

impl StatusSink for Vec<StatusEvent> {
    fn report(&mut self, event: StatusEvent) {
        self.push(event);
    }
}

/// Forwards progress to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn report(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::Started { procedure } => log::info!("{procedure} calibration started"),
            StatusEvent::PointFound { index, position } => log::info!(
                "point {} found at {:.3}, {:.3}, {:.3}",
                index + 1,
                position.x,
                position.y,
                position.z
            ),
            StatusEvent::Edge { index, edge } => log::debug!(
                "point {}: {:?} edge at {:.3}, {:.3}",
                index + 1,
                edge.side,
                edge.position.x,
                edge.position.y
            ),
            StatusEvent::Finished { procedure, result } => {
                log::info!("{procedure} calibration finished: {result}")
            }
            StatusEvent::ScanFinished { complete } => log::info!("scan finished, complete: {complete}"),
        }
    }
}
