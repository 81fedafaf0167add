//! Initial acquisition of a target: Z homing and the coarse XY raster.

use nalgebra::{Point2, Point3};

use crate::error::{ProbeError, SearchPhase};
use crate::motion::Motion;
use crate::prober::Prober;

#[cfg(feature = "tracing")]
use tracing::instrument;

impl<M: Motion + ?Sized> Prober<'_, M> {
    /// Find the trigger height below the current XY.
    ///
    /// Descends to `min_z` at the homing feed, retracts, then descends again
    /// at a quarter of the feed. Both descents must trigger.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn find_point_z(&mut self, min_z: f32) -> Result<f32, ProbeError> {
        self.with_switches(true, |p| {
            let feed = p.feed.z;
            let fast = Point3::new(p.pos.x, p.pos.y, min_z);
            if !p.probe_move(fast, feed) {
                return Err(ProbeError::not_found(SearchPhase::ZFast));
            }

            let retract = p.params.z_retract;
            p.go_z(p.pos.z + retract);

            let slow_z = (p.pos.z - 2.0 * retract).min(min_z);
            let slow = Point3::new(p.pos.x, p.pos.y, slow_z);
            if !p.probe_move(slow, feed / 4.0) {
                return Err(ProbeError::not_found(SearchPhase::ZSlow));
            }
            Ok(p.pos.z)
        })
    }

    /// [`Prober::find_point_z`] down to the configured floor.
    pub fn home_z(&mut self) -> Result<f32, ProbeError> {
        self.find_point_z(self.params.z_floor)
    }

    /// Search the neighbourhood of the current XY for a target and move to
    /// its estimated center.
    ///
    /// A zig-zag raster with continuously decreasing Z finds the first
    /// trigger. At that height forward and backward rasters bisect Y, then
    /// an X cross and a Y cross bisect the center. Each failed plane attempt
    /// lowers Z slightly.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn find_point_xy(&mut self) -> Result<Point2<f32>, ProbeError> {
        self.with_switches(false, |p| {
            let (x0, x1) = p.span_x(p.pos.x, p.params.raster_radius_x);
            let (y0, y1) = p.span_y(p.pos.y, p.params.raster_radius_y);
            let nsteps = (((y1 - y0) / p.params.raster_step).ceil() as usize).max(2);
            let dy = (y1 - y0) / (nsteps - 1) as f32;

            p.raster(x0, x1, y0, y1, nsteps, dy)?;
            log::trace!("first raster hit at {:?}", p.pos);

            for attempt in 0..p.params.plane_attempts {
                if attempt > 0 {
                    let z = p.pos.z - p.params.plane_retry_drop;
                    p.go_z(z);
                }
                if let Some(center) = p.plane_search(x0, x1, y0, y1, nsteps, dy) {
                    return Ok(center);
                }
                log::debug!("plane search attempt {} failed at z {:.3}", attempt + 1, p.pos.z);
            }
            Err(ProbeError::not_found(SearchPhase::XyPlane))
        })
    }

    /// Zig-zag raster lowering Z on every line until the probe triggers.
    fn raster(
        &mut self,
        x0: f32,
        x1: f32,
        y0: f32,
        y1: f32,
        nsteps: usize,
        dy: f32,
    ) -> Result<(), ProbeError> {
        let feed = self.feed.xy;
        let z_step = self.params.raster_z_drop / nsteps as f32;
        let z_start = self.pos.z;
        self.go_xyz(Point3::new(x0, y0, z_start), feed);

        let mut z = z_start;
        let mut forward_x = true;
        while z > self.params.raster_z_floor {
            for line in 0..2 * nsteps {
                let y = if line < nsteps {
                    y0 + line as f32 * dy
                } else {
                    y1 - (line - nsteps) as f32 * dy
                };
                z -= z_step;
                let x = if forward_x { x1 } else { x0 };
                forward_x = !forward_x;
                if self.probe_move(Point3::new(x, y, z), feed) {
                    return Ok(());
                }
            }
        }
        Err(ProbeError::not_found(SearchPhase::XyRaster))
    }

    /// One plane attempt at the current height.
    fn plane_search(
        &mut self,
        x0: f32,
        x1: f32,
        y0: f32,
        y1: f32,
        nsteps: usize,
        dy: f32,
    ) -> Option<Point2<f32>> {
        let a = self.plane_raster(x0, x1, y0, dy, nsteps)?;
        let b = self.plane_raster(x0, x1, y1, -dy, nsteps)?;
        let y = 0.5 * (a + b);

        let a = self.approach(Point2::new(x0, y), Point2::new(x1, y))?;
        let b = self.approach(Point2::new(x1, y), Point2::new(x0, y))?;
        let x = 0.5 * (a.x + b.x);
        self.go_xy(x, y);

        let a = self.approach(Point2::new(x, y0), Point2::new(x, y1))?;
        let b = self.approach(Point2::new(x, y1), Point2::new(x, y0))?;
        let y = 0.5 * (a.y + b.y);
        self.go_xy(x, y);
        Some(Point2::new(x, y))
    }

    /// Zig-zag over the plane from `y_start`, returning the Y of the first trigger.
    fn plane_raster(&mut self, x0: f32, x1: f32, y_start: f32, dy: f32, nsteps: usize) -> Option<f32> {
        self.go_xy(x0, y_start);
        let z = self.pos.z;
        for i in 0..nsteps {
            let y = y_start + i as f32 * dy;
            let x = if i % 2 == 0 { x1 } else { x0 };
            if self.probe_move(Point3::new(x, y, z), self.feed.xy) {
                return Some(self.pos.y);
            }
        }
        None
    }
}
