use bed_calib_core::{Feedrates, MachineLimits};
use nalgebra::{Point2, Point3};

use crate::motion::Motion;
use crate::params::SearchParams;

/// Drives probe searches around one reference target.
///
/// The prober tracks the achieved head position, clamps every XY move to
/// the machine limits and keeps the probe check off on travel moves. The
/// search strategies live in the `find`, `refine` and `scan` modules.
pub struct Prober<'a, M: Motion + ?Sized> {
    pub(crate) motion: &'a mut M,
    pub(crate) limits: MachineLimits,
    pub(crate) feed: Feedrates,
    pub(crate) params: SearchParams,
    pub(crate) verbosity: i8,
    pub(crate) pos: Point3<f32>,
}

impl<'a, M: Motion + ?Sized> Prober<'a, M> {
    pub fn new(
        motion: &'a mut M,
        limits: MachineLimits,
        feed: Feedrates,
        params: SearchParams,
    ) -> Self {
        let pos = motion.position();
        Self {
            motion,
            limits,
            feed,
            params,
            verbosity: 0,
            pos,
        }
    }

    pub fn with_verbosity(mut self, verbosity: i8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[inline]
    pub fn position(&self) -> Point3<f32> {
        self.pos
    }

    #[inline]
    pub fn limits(&self) -> &MachineLimits {
        &self.limits
    }

    #[inline]
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    #[inline]
    pub fn feedrates(&self) -> &Feedrates {
        &self.feed
    }

    pub fn motion(&mut self) -> &mut M {
        &mut *self.motion
    }

    pub(crate) fn sync(&mut self) {
        self.pos = self.motion.position();
    }

    /// Travel move with the probe check off. XY is clamped to the limits.
    pub fn go_xyz(&mut self, target: Point3<f32>, feedrate: f32) {
        self.motion.enable_probe(false);
        self.motion
            .go_to(self.limits.clamp_xy(target), feedrate);
        self.sync();
    }

    /// Travel in XY at the current height.
    pub fn go_xy(&mut self, x: f32, y: f32) {
        let z = self.pos.z;
        self.go_xyz(Point3::new(x, y, z), self.feed.xy);
    }

    /// Travel in Z at the current XY.
    pub fn go_z(&mut self, z: f32) {
        let p = Point3::new(self.pos.x, self.pos.y, z);
        self.go_xyz(p, self.feed.z);
    }

    /// Move with the probe check on. Returns whether the probe stopped the move.
    pub(crate) fn probe_move(&mut self, target: Point3<f32>, feedrate: f32) -> bool {
        self.motion.probe_triggered();
        self.motion.enable_probe(true);
        self.motion
            .go_to(self.limits.clamp_xy(target), feedrate);
        self.sync();
        let hit = self.motion.probe_triggered();
        self.motion.enable_probe(false);
        hit
    }

    /// Travel to `from`, then sweep towards `to` at the current height.
    /// Returns where the probe triggered.
    pub(crate) fn approach(&mut self, from: Point2<f32>, to: Point2<f32>) -> Option<Point2<f32>> {
        self.go_xy(from.x, from.y);
        let target = Point3::new(to.x, to.y, self.pos.z);
        if self.probe_move(target, self.feed.xy) {
            Some(self.pos.xy())
        } else {
            None
        }
    }

    /// Trigger edges of an X chord at height `y` between `x0` and `x1`.
    pub(crate) fn chord(&mut self, y: f32, x0: f32, x1: f32) -> Option<(f32, f32)> {
        let a = self.approach(Point2::new(x0, y), Point2::new(x1, y))?;
        let b = self.approach(Point2::new(x1, y), Point2::new(x0, y))?;
        if self.verbosity >= 5 {
            log::debug!("measured left {:.5}, {:.5}, {:.5}", a.x, a.y, self.pos.z);
            log::debug!("measured right {:.5}, {:.5}, {:.5}", b.x, b.y, self.pos.z);
        }
        Some((a.x, b.x))
    }

    /// Run `f` with the hard limits set to `endstops`, restoring the caller's
    /// endstop and probe state afterwards.
    pub(crate) fn with_switches<T>(&mut self, endstops: bool, f: impl FnOnce(&mut Self) -> T) -> T {
        let endstops_before = self.motion.enable_endstops(endstops);
        let probe_before = self.motion.enable_probe(false);
        let out = f(self);
        self.motion.enable_endstops(endstops_before);
        self.motion.enable_probe(probe_before);
        out
    }

    /// Clamped `[c - r, c + r]` in X.
    pub(crate) fn span_x(&self, c: f32, r: f32) -> (f32, f32) {
        (self.limits.clamp_x(c - r), self.limits.clamp_x(c + r))
    }

    /// Clamped `[c - r, c + r]` in Y.
    pub(crate) fn span_y(&self, c: f32, r: f32) -> (f32, f32) {
        (self.limits.clamp_y(c - r), self.limits.clamp_y(c + r))
    }
}
