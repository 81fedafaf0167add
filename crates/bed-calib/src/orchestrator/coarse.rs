use bed_calib_core::{CalibrationResult, BED_REF_POINTS_4};
use bed_calib_probe::{Motion, Prober};
use bed_calib_solver::fit_skew_and_offset;

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{commit, BedCalibrator, CalibrationError, CalibrationRun, Machine};
use crate::collab::{Procedure, StatusEvent};

impl BedCalibrator {
    /// Coarse detection on the 4-point grid.
    ///
    /// Probes each point from its nominal position with the transform
    /// neutralised, fits the correction and commits it. Required before
    /// [`BedCalibrator::refine`].
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, m)))]
    pub fn coarse(&self, m: &mut Machine<'_>, verbosity: i8) -> CalibrationRun {
        m.watchdog.refresh();
        m.status.report(StatusEvent::Started {
            procedure: Procedure::Coarse,
        });
        let endstops = m.motion.enable_endstops(false);

        let mut run = CalibrationRun::new(Procedure::Coarse);
        let outcome = self.run_coarse(m, verbosity, &mut run);
        self.finish(m, &mut run, outcome);

        m.motion.enable_endstops(endstops);
        run
    }

    /// [`BedCalibrator::coarse`], verdict only.
    pub fn find_offset_and_skew(&self, m: &mut Machine<'_>, verbosity: i8) -> CalibrationResult {
        self.coarse(m, verbosity).result
    }

    fn run_coarse(
        &self,
        m: &mut Machine<'_>,
        verbosity: i8,
        run: &mut CalibrationRun,
    ) -> Result<CalibrationResult, CalibrationError> {
        let p = &self.params;
        m.w2m.reset();
        let mut prober = self.prober(&mut *m.motion, verbosity);

        let mut z = p.search_height;
        for (k, target) in BED_REF_POINTS_4.iter().enumerate() {
            m.watchdog.refresh();
            prober.go_z(z);
            prober.go_xy(target.x, target.y);
            prober
                .find_point_xy()
                .map_err(CalibrationError::not_found(k))?;
            prober
                .find_point_z(p.search.z_floor)
                .map_err(CalibrationError::not_found(k))?;
            if k == 0 {
                self.settle_front_point(&mut prober)?;
            }

            let pos = prober.position();
            run.measured.push(pos.xy());
            m.status.report(StatusEvent::PointFound {
                index: k,
                position: pos,
            });
            z = pos.z + p.coarse_lift;
        }

        let fit = fit_skew_and_offset(&run.measured, &BED_REF_POINTS_4, &p.solver, verbosity)?;
        let head = prober.position().xy();
        run.fit = Some(fit.clone());
        run.head_world = Some(commit(&fit, m.w2m, &mut *m.storage, head)?);
        Ok(fit.result)
    }

    /// The front point sits next to the Y travel limit, where the plane
    /// search cannot bisect Y. Re-center it with zig-zag chords, lowering Z
    /// between attempts.
    fn settle_front_point<M: Motion + ?Sized>(
        &self,
        prober: &mut Prober<'_, M>,
    ) -> Result<(), CalibrationError> {
        let p = &self.params;
        let mut attempts = p.front_point_attempts.max(1);
        loop {
            match prober.improve_zigzag() {
                Ok(_) => return Ok(()),
                Err(source) => {
                    attempts -= 1;
                    if attempts == 0 {
                        return Err(CalibrationError::SensorNotFound { index: 0, source });
                    }
                    let z = prober.position().z - p.retry_z_step;
                    log::debug!("front point not found, lowering to z {z:.3}");
                    prober.go_z(z);
                }
            }
        }
    }
}
