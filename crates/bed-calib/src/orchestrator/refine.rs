use bed_calib_core::{
    mesh_cell, CalibrationResult, CalibrationStorage, Point2, Vector2, ZJitter, BED_REF_POINTS_9,
    FIRST_ROW_POINTS, MESH_COLS, MESH_ROWS,
};
use bed_calib_probe::{Motion, PointStatus, Prober, RefineStrategy};
use bed_calib_solver::fit_skew_and_offset;

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{commit, BedCalibrator, CalibrationError, CalibrationRun, Machine};
use crate::collab::{MeshGrid, Procedure, StatusEvent};

/// Front points whose reachability is reported in the verdict.
const FRONT_LEFT: usize = 0;
const FRONT_RIGHT: usize = 2;

impl BedCalibrator {
    /// Iterative refinement on the 9-point grid.
    ///
    /// Starts every point from the installed transform, refines it
    /// repeatedly and averages the readings after the warm-up. On success the
    /// new correction is committed, the bed height is sampled into the mesh
    /// and the Z-jitter table is stored.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, m)))]
    pub fn refine(
        &self,
        m: &mut Machine<'_>,
        strategy: RefineStrategy,
        verbosity: i8,
    ) -> CalibrationRun {
        m.watchdog.refresh();
        m.status.report(StatusEvent::Started {
            procedure: Procedure::Refine,
        });
        let endstops = m.motion.enable_endstops(false);

        let mut run = CalibrationRun::new(Procedure::Refine);
        let outcome = self.run_refine(m, strategy, verbosity, &mut run);
        self.finish(m, &mut run, outcome);

        m.motion.enable_endstops(endstops);
        run
    }

    /// [`BedCalibrator::refine`], verdict only.
    pub fn improve_offset_and_skew(
        &self,
        m: &mut Machine<'_>,
        strategy: RefineStrategy,
        verbosity: i8,
    ) -> CalibrationResult {
        self.refine(m, strategy, verbosity).result
    }

    fn run_refine(
        &self,
        m: &mut Machine<'_>,
        strategy: RefineStrategy,
        verbosity: i8,
        run: &mut CalibrationRun,
    ) -> Result<CalibrationResult, CalibrationError> {
        let p = &self.params;
        m.mesh.clear();
        let cached = *m.w2m;
        m.w2m.reset();
        let mut prober = self.prober(&mut *m.motion, verbosity);

        let mut front_far = [false; FIRST_ROW_POINTS];
        for (k, target) in BED_REF_POINTS_9.iter().enumerate() {
            m.watchdog.refresh();
            prober.go_z(p.search_height);
            let guess = cached.apply(*target);
            prober.go_xy(guess.x, guess.y);
            prober
                .find_point_z(p.search.z_floor)
                .map_err(CalibrationError::not_found(k))?;

            let (center, status) = self.refine_point(&mut prober, k, strategy, verbosity)?;
            if let Some(far) = front_far.get_mut(k) {
                *far = status == PointStatus::Far;
            }
            run.measured.push(center);
            let mut position = prober.position();
            position.x = center.x;
            position.y = center.y;
            m.status.report(StatusEvent::PointFound { index: k, position });
        }
        m.watchdog.refresh();

        if verbosity >= 5 {
            for (k, c) in run.measured.iter().enumerate() {
                log::info!("final measured bed point {k}: {:.5}, {:.5}", c.x, c.y);
            }
        }

        let fit = fit_skew_and_offset(&run.measured, &BED_REF_POINTS_9, &p.solver, verbosity)?;
        let head = prober.position().xy();
        run.fit = Some(fit.clone());
        run.head_world = Some(commit(&fit, m.w2m, &mut *m.storage, head)?);

        let mut result = fit.result;
        for (k, far) in front_far.iter().enumerate() {
            if !far {
                continue;
            }
            run.far_points.push(k);
            result = match k {
                FRONT_LEFT => CalibrationResult::FrontLeftTooFar,
                FRONT_RIGHT => CalibrationResult::FrontRightTooFar,
                _ => result,
            };
        }

        // Bed heights under the new transform, relative to the first point.
        let mut z_ref = None;
        for (k, target) in BED_REF_POINTS_9.iter().enumerate() {
            m.watchdog.refresh();
            prober.go_z(p.search_height);
            let at = m.w2m.apply(*target);
            prober.go_xy(at.x, at.y);
            let z = prober
                .find_point_z(p.search.z_floor)
                .map_err(CalibrationError::not_found(k))?;
            let z_ref = *z_ref.get_or_insert(z);
            let (col, row) = mesh_cell(k);
            m.mesh.set_z(col, row, z - z_ref);
        }

        let span = z_span(&*m.mesh);
        if span > p.max_z_span {
            return Err(CalibrationError::ZSpanTooLarge { span });
        }

        let jitter = z_jitter(&*m.mesh);
        CalibrationStorage::new(&mut *m.storage).store_z_jitter(&jitter)?;
        if verbosity >= 1 {
            log::info!("bed Z jitter (0.01 mm): {jitter:?}");
        }
        run.z_jitter = Some(jitter);

        m.mesh.upsample();
        m.mesh.set_active(true);
        m.watchdog.refresh();

        prober.go_z(p.limits.z_min);
        let park = p.limits.park_xy();
        prober.go_xy(park.x, park.y);
        Ok(result)
    }

    /// Refine the point under the head and average the readings after the
    /// warm-up. Returns the average and the status of the last reading.
    fn refine_point<M: Motion + ?Sized>(
        &self,
        prober: &mut Prober<'_, M>,
        index: usize,
        strategy: RefineStrategy,
        verbosity: i8,
    ) -> Result<(Point2<f32>, PointStatus), CalibrationError> {
        let p = &self.params;
        let (iterations, warmup) = p.refine_schedule();

        let mut sum = Vector2::<f32>::zeros();
        let mut last = PointStatus::Ok;
        let mut failures = 0;
        let mut iter = 0;
        while iter < iterations {
            let found = if index < FIRST_ROW_POINTS {
                // No room in front of the first row for a Y approach.
                prober.improve_zigzag()
            } else {
                prober.improve(strategy)
            };
            match found {
                Ok(status) => {
                    if iter >= warmup {
                        sum += prober.position().xy().coords;
                    }
                    last = status;
                    failures = 0;
                    iter += 1;
                }
                Err(source) => {
                    failures += 1;
                    if failures >= p.max_consecutive_failures {
                        return Err(CalibrationError::SensorNotFound { index, source });
                    }
                    let z = prober.position().z - p.retry_z_step;
                    if verbosity > 20 {
                        log::debug!(
                            "improving bed point {index}, iteration {iter} failed, lowering z to {z:.5}"
                        );
                    }
                    prober.go_z(z);
                }
            }
        }
        let n = (iterations - warmup) as f32;
        Ok((Point2::from(sum / n), last))
    }
}

/// Spread of the 3x3 samples.
fn z_span(mesh: &dyn MeshGrid) -> f32 {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for row in 0..MESH_ROWS {
        for col in 0..MESH_COLS {
            let z = mesh.z(col, row);
            lo = lo.min(z);
            hi = hi.max(z);
        }
    }
    hi - lo
}

/// Offsets from cell (0,0) in 0.01 mm, row-major without the reference cell.
fn z_jitter(mesh: &dyn MeshGrid) -> ZJitter {
    let z0 = mesh.z(0, 0);
    let mut out = ZJitter::default();
    let cells = (0..MESH_ROWS)
        .flat_map(|row| (0..MESH_COLS).map(move |col| (col, row)))
        .skip(1);
    for (slot, (col, row)) in out.iter_mut().zip(cells) {
        let dif = mesh.z(col, row) - z0;
        *slot = (dif * 100.0 + 0.5).floor() as i16;
    }
    out
}
