//! Calibration procedures.
//!
//! Each procedure refreshes the watchdog per reference point, neutralises
//! the world-to-machine transform while probing in machine coordinates and
//! either replaces it at the commit point (coarse, refine) or restores it
//! (scan). Every failure rolls back to a lifted head, an unset record and
//! the identity transform.

mod coarse;
mod error;
mod refine;
mod scan;

use bed_calib_core::{
    ByteStore, CalibrationResult, CalibrationStorage, Point2, Point3, StorageError, World2Machine,
    ZJitter,
};
use bed_calib_probe::{Motion, Prober, ScanEdge};
use bed_calib_solver::SkewFit;
use serde::{Deserialize, Serialize};

use crate::collab::{MeshGrid, Procedure, StatusEvent, StatusSink, Watchdog};
use crate::params::CalibrationParams;

pub use error::CalibrationError;

/// The collaborators a procedure drives.
pub struct Machine<'a> {
    pub motion: &'a mut dyn Motion,
    pub storage: &'a mut dyn ByteStore,
    pub mesh: &'a mut dyn MeshGrid,
    pub watchdog: &'a mut dyn Watchdog,
    pub status: &'a mut dyn StatusSink,
    /// Transform used by every other motion translation.
    pub w2m: &'a mut World2Machine,
}

/// Outcome of a coarse or refine run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRun {
    pub procedure: Procedure,
    pub result: CalibrationResult,
    /// Measured machine positions, index-aligned with the reference grid.
    pub measured: Vec<Point2<f32>>,
    #[serde(default)]
    pub fit: Option<SkewFit>,
    /// Front points whose center lies beyond the Y travel limit.
    #[serde(default)]
    pub far_points: Vec<usize>,
    #[serde(default)]
    pub z_jitter: Option<ZJitter>,
    /// Head position when the correction was installed, in the new world frame.
    #[serde(default)]
    pub head_world: Option<Point2<f32>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CalibrationRun {
    fn new(procedure: Procedure) -> Self {
        Self {
            procedure,
            result: CalibrationResult::Failed,
            measured: Vec::new(),
            fit: None,
            far_points: Vec::new(),
            z_jitter: None,
            head_world: None,
            error: None,
        }
    }
}

/// Edges recorded around one reference point by the diagnostic scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointScan {
    pub index: usize,
    pub edges: Vec<ScanEdge>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    /// Whether every reference point was reached.
    pub complete: bool,
    pub points: Vec<PointScan>,
}

/// Runs the calibration procedures with a fixed parameter set.
#[derive(Clone, Debug, Default)]
pub struct BedCalibrator {
    params: CalibrationParams,
}

impl BedCalibrator {
    pub fn new(params: CalibrationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    fn prober<'m, M: Motion + ?Sized>(&self, motion: &'m mut M, verbosity: i8) -> Prober<'m, M> {
        let p = &self.params;
        Prober::new(motion, p.limits, p.feedrates, p.search.clone()).with_verbosity(verbosity)
    }

    /// Common tail of coarse and refine: roll back on error, report.
    fn finish(
        &self,
        m: &mut Machine<'_>,
        run: &mut CalibrationRun,
        outcome: Result<CalibrationResult, CalibrationError>,
    ) {
        m.watchdog.refresh();
        match outcome {
            Ok(result) => run.result = result,
            Err(e) => {
                log::warn!("{} calibration failed: {e}", run.procedure);
                self.rollback(m);
                run.result = CalibrationResult::Failed;
                run.error = Some(e.to_string());
            }
        }
        m.status.report(StatusEvent::Finished {
            procedure: run.procedure,
            result: run.result,
        });
    }

    /// Lift the head, erase the record and install the identity.
    fn rollback(&self, m: &mut Machine<'_>) {
        let p = m.motion.position();
        m.motion.enable_probe(false);
        m.motion.go_to(
            Point3::new(p.x, p.y, self.params.search_height),
            self.params.feedrates.z,
        );
        if let Err(e) = CalibrationStorage::new(&mut *m.storage).reset() {
            log::warn!("failed to erase calibration record: {e}");
        }
        m.w2m.reset();
    }
}

/// Validate the fit, install it and persist it. Returns `head`, the current
/// machine position, re-expressed in the new world frame.
fn commit(
    fit: &SkewFit,
    w2m: &mut World2Machine,
    store: &mut dyn ByteStore,
    head: Point2<f32>,
) -> Result<Point2<f32>, CalibrationError> {
    if fit.result.is_failed() {
        return Err(CalibrationError::ResidualTooLarge {
            max_error: fit.max_error(),
        });
    }
    fit.correction.validate()?;
    w2m.update(&fit.correction)?;
    CalibrationStorage::new(store).store_correction(&fit.correction)?;

    let world = w2m.apply_inverse(head);
    log::info!(
        "bed correction installed ({}), head now at world {:.3}, {:.3}",
        fit.result,
        world.x,
        world.y
    );
    Ok(world)
}

/// Erase the stored correction and Z-jitter table.
pub fn reset_calibration(store: &mut dyn ByteStore) -> Result<(), StorageError> {
    CalibrationStorage::new(store).reset()
}

/// Whether the stored Z-jitter table is complete.
pub fn is_z_jitter_data_valid(store: &mut dyn ByteStore) -> bool {
    CalibrationStorage::new(store).is_z_jitter_valid()
}
