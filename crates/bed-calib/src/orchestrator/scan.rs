use bed_calib_core::BED_REF_POINTS_9;

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{BedCalibrator, Machine, PointScan, ScanRun};
use crate::collab::{Procedure, StatusEvent};

impl BedCalibrator {
    /// Diagnostic scan of the trigger edges around every refined-grid point.
    ///
    /// Never changes the stored record; the transform is restored afterwards.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, m)))]
    pub fn scan(&self, m: &mut Machine<'_>, verbosity: i8) -> ScanRun {
        let p = &self.params;
        m.watchdog.refresh();
        m.status.report(StatusEvent::Started {
            procedure: Procedure::Scan,
        });
        let endstops = m.motion.enable_endstops(false);
        let cached = *m.w2m;
        m.w2m.reset();

        let mut run = ScanRun {
            complete: true,
            points: Vec::with_capacity(BED_REF_POINTS_9.len()),
        };
        {
            let mut prober = self.prober(&mut *m.motion, verbosity);
            for (k, target) in BED_REF_POINTS_9.iter().enumerate() {
                m.watchdog.refresh();
                prober.go_z(p.search_height);
                let at = cached.apply(*target);
                prober.go_xy(at.x, at.y);
                if let Err(e) = prober.find_point_z(p.search.z_floor) {
                    log::warn!("scan of point {k} skipped: {e}");
                    run.complete = false;
                    continue;
                }
                let edges = prober.scan_point();
                for edge in &edges {
                    m.status.report(StatusEvent::Edge { index: k, edge: *edge });
                }
                run.points.push(PointScan { index: k, edges });
            }
            prober.go_z(p.search_height);
        }

        *m.w2m = cached;
        m.motion.enable_endstops(endstops);
        m.watchdog.refresh();
        m.status.report(StatusEvent::ScanFinished {
            complete: run.complete,
        });
        run
    }

    /// [`BedCalibrator::scan`], reporting whether every point was scanned.
    pub fn scan_induction_points(&self, m: &mut Machine<'_>, verbosity: i8) -> bool {
        self.scan(m, verbosity).complete
    }
}
