//! Analytic [`Motion`] implementation for tests and dry runs.
//!
//! Each reference target is a disk in machine XY that engages the probe
//! below its trigger height. The bare bed optionally engages the probe below
//! the bed surface, which is a tilted plane. Probe moves stop a small
//! overshoot past the first contact.

use bed_calib_core::{AffineCorrection, MachineLimits, BED_REF_POINTS_9};
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::motion::Motion;

/// Bed surface `z = z0 + slope_x·x + slope_y·y` in machine coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BedPlane {
    pub z0: f32,
    pub slope_x: f32,
    pub slope_y: f32,
}

impl BedPlane {
    #[inline]
    pub fn height(&self, x: f32, y: f32) -> f32 {
        self.z0 + self.slope_x * x + self.slope_y * y
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimTarget {
    pub center: Point2<f32>,
    pub radius: f32,
    /// The probe engages over the target at or below this height.
    pub trigger_z: f32,
}

/// Description of a simulated printer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimBedConfig {
    /// True world-to-machine geometry. Targets sit at the refined reference
    /// points mapped through it.
    pub geometry: AffineCorrection,
    pub surface: BedPlane,
    pub target_radius: f32,
    /// Trigger height of the targets above the bed surface.
    pub target_height: f32,
    /// Extra trigger height per refined-grid point; missing entries are zero.
    pub height_offsets: Vec<f32>,
    /// Refined-grid points without a target.
    pub missing_targets: Vec<usize>,
    /// Whether the bare bed engages the probe below its surface.
    pub bare_bed_contact: bool,
    /// Distance travelled past the contact before a probe move stops.
    pub overshoot: f32,
    pub start: Point3<f32>,
}

impl Default for SimBedConfig {
    fn default() -> Self {
        Self {
            geometry: AffineCorrection::IDENTITY,
            surface: BedPlane::default(),
            target_radius: 2.5,
            target_height: 1.0,
            height_offsets: Vec::new(),
            missing_targets: Vec::new(),
            bare_bed_contact: true,
            overshoot: 0.001,
            start: Point3::new(0.0, 0.0, 10.0),
        }
    }
}

impl SimBedConfig {
    pub fn targets(&self) -> Vec<SimTarget> {
        BED_REF_POINTS_9
            .iter()
            .enumerate()
            .filter(|(k, _)| !self.missing_targets.contains(k))
            .map(|(k, p)| {
                let center = self.geometry.apply(*p);
                let offset = self.height_offsets.get(k).copied().unwrap_or(0.0);
                SimTarget {
                    center,
                    radius: self.target_radius,
                    trigger_z: self.surface.height(center.x, center.y)
                        + self.target_height
                        + offset,
                }
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct SimulatedBed {
    targets: Vec<SimTarget>,
    floor: Option<BedPlane>,
    limits: MachineLimits,
    overshoot: f32,
    pos: Point3<f32>,
    endstops: bool,
    probe: bool,
    latched: bool,
    moves: usize,
}

impl SimulatedBed {
    pub fn new(targets: Vec<SimTarget>, floor: Option<BedPlane>, limits: MachineLimits) -> Self {
        Self {
            targets,
            floor,
            limits,
            overshoot: 0.001,
            pos: Point3::new(limits.x_min, limits.y_min.max(0.0), 10.0),
            endstops: true,
            probe: false,
            latched: false,
            moves: 0,
        }
    }

    pub fn from_config(cfg: &SimBedConfig, limits: MachineLimits) -> Self {
        let floor = cfg.bare_bed_contact.then_some(cfg.surface);
        let mut bed = Self::new(cfg.targets(), floor, limits);
        bed.overshoot = cfg.overshoot;
        bed.pos = limits.clamp_xy(cfg.start);
        bed
    }

    pub fn targets(&self) -> &[SimTarget] {
        &self.targets
    }

    /// Number of `go_to` calls so far.
    pub fn moves(&self) -> usize {
        self.moves
    }

    pub fn endstops_enabled(&self) -> bool {
        self.endstops
    }

    pub fn probe_enabled(&self) -> bool {
        self.probe
    }

    /// Place the head without a move.
    pub fn set_position(&mut self, p: Point3<f32>) {
        self.pos = p;
    }

    fn engaged_at(&self, p: &Point3<f32>) -> bool {
        let on_target = self.targets.iter().any(|t| {
            (p.xy() - t.center).norm() <= t.radius && p.z <= t.trigger_z
        });
        let on_bed = self
            .floor
            .map(|f| p.z <= f.height(p.x, p.y))
            .unwrap_or(false);
        on_target || on_bed
    }

    /// Earliest segment parameter in `[0, 1]` at which the probe engages.
    fn first_contact(&self, from: &Point3<f32>, to: &Point3<f32>) -> Option<f64> {
        let p0 = from.cast::<f64>();
        let d: Vector3<f64> = (to - from).cast::<f64>();

        let mut best: Option<f64> = None;
        let mut consider = |lo: f64, hi: f64| {
            let lo = lo.max(0.0);
            let hi = hi.min(1.0);
            if lo <= hi {
                best = Some(best.map_or(lo, |b: f64| b.min(lo)));
            }
        };

        for t in &self.targets {
            let Some((d0, d1)) = disk_interval(&p0, &d, t) else {
                continue;
            };
            let Some((z0, z1)) = below_interval(p0.z - t.trigger_z as f64, d.z) else {
                continue;
            };
            consider(d0.max(z0), d1.min(z1));
        }

        if let Some(f) = self.floor {
            let g0 = p0.z - f.height(from.x, from.y) as f64;
            let gd = d.z - f.slope_x as f64 * d.x - f.slope_y as f64 * d.y;
            if let Some((lo, hi)) = below_interval(g0, gd) {
                consider(lo, hi);
            }
        }
        best
    }
}

/// `t` interval where the XY track lies inside the target disk.
fn disk_interval(p0: &Point3<f64>, d: &Vector3<f64>, t: &SimTarget) -> Option<(f64, f64)> {
    let wx = p0.x - t.center.x as f64;
    let wy = p0.y - t.center.y as f64;
    let r = t.radius as f64;
    let a = d.x * d.x + d.y * d.y;
    let b = 2.0 * (wx * d.x + wy * d.y);
    let c = wx * wx + wy * wy - r * r;
    if a < 1e-18 {
        return (c <= 0.0).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();
    Some(((-b - s) / (2.0 * a), (-b + s) / (2.0 * a)))
}

/// `t` interval where `g0 + t·gd <= 0`.
fn below_interval(g0: f64, gd: f64) -> Option<(f64, f64)> {
    if gd.abs() < 1e-18 {
        return (g0 <= 0.0).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let t = -g0 / gd;
    if gd < 0.0 {
        Some((t, f64::INFINITY))
    } else {
        Some((f64::NEG_INFINITY, t))
    }
}

impl Motion for SimulatedBed {
    fn go_to(&mut self, target: Point3<f32>, _feedrate: f32) {
        self.moves += 1;
        let target = self.limits.clamp_xy(target);

        if !self.probe {
            self.pos = target;
            return;
        }
        if self.engaged_at(&self.pos) {
            self.latched = true;
            return;
        }

        let from = self.pos;
        match self.first_contact(&from, &target) {
            Some(t) => {
                let len = (target - from).norm() as f64;
                let t = if len > 0.0 {
                    (t + self.overshoot as f64 / len).min(1.0)
                } else {
                    1.0
                };
                self.pos = from + (target - from) * t as f32;
                self.latched = true;
            }
            None => self.pos = target,
        }
    }

    fn position(&self) -> Point3<f32> {
        self.pos
    }

    fn enable_endstops(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.endstops, on)
    }

    fn enable_probe(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.probe, on)
    }

    fn probe_triggered(&mut self) -> bool {
        std::mem::take(&mut self.latched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn one_target() -> SimulatedBed {
        let target = SimTarget {
            center: Point2::new(100.0, 100.0),
            radius: 2.5,
            trigger_z: 1.0,
        };
        SimulatedBed::new(vec![target], None, MachineLimits::default())
    }

    #[test]
    fn travel_ignores_targets() {
        let mut bed = one_target();
        bed.go_to(Point3::new(100.0, 100.0, 0.0), 10.0);
        assert_eq!(bed.position(), Point3::new(100.0, 100.0, 0.0));
        assert!(!bed.probe_triggered());
    }

    #[test]
    fn probe_move_stops_at_disk_edge() {
        let mut bed = one_target();
        bed.set_position(Point3::new(90.0, 100.0, 0.5));
        bed.enable_probe(true);
        bed.go_to(Point3::new(110.0, 100.0, 0.5), 10.0);
        assert!(bed.probe_triggered());
        assert!(!bed.probe_triggered(), "trigger flag is edge latched");
        assert_abs_diff_eq!(bed.position().x, 97.501, epsilon = 1e-4);
    }

    #[test]
    fn probe_move_stops_at_trigger_height() {
        let mut bed = one_target();
        bed.set_position(Point3::new(100.0, 100.0, 5.0));
        bed.enable_probe(true);
        bed.go_to(Point3::new(100.0, 100.0, -10.0), 10.0);
        assert!(bed.probe_triggered());
        assert_abs_diff_eq!(bed.position().z, 0.999, epsilon = 1e-4);
    }

    #[test]
    fn engaged_start_halts_immediately() {
        let mut bed = one_target();
        bed.set_position(Point3::new(100.0, 100.0, 0.5));
        bed.enable_probe(true);
        bed.go_to(Point3::new(120.0, 100.0, 0.5), 10.0);
        assert!(bed.probe_triggered());
        assert_eq!(bed.position(), Point3::new(100.0, 100.0, 0.5));
    }

    #[test]
    fn bare_bed_floor_engages_below_surface() {
        let plane = BedPlane {
            z0: 0.2,
            slope_x: 0.001,
            slope_y: 0.0,
        };
        let mut bed = SimulatedBed::new(Vec::new(), Some(plane), MachineLimits::default());
        bed.set_position(Point3::new(50.0, 50.0, 5.0));
        bed.enable_probe(true);
        bed.go_to(Point3::new(50.0, 50.0, -10.0), 10.0);
        assert!(bed.probe_triggered());
        assert_abs_diff_eq!(bed.position().z, 0.249, epsilon = 1e-4);
    }

    #[test]
    fn config_places_targets_through_geometry() {
        let cfg = SimBedConfig {
            geometry: AffineCorrection::new(
                nalgebra::Vector2::new(1.0, 0.0),
                nalgebra::Vector2::new(0.0, 1.0),
                nalgebra::Vector2::new(0.5, -0.25),
            ),
            missing_targets: vec![3],
            ..SimBedConfig::default()
        };
        let targets = cfg.targets();
        assert_eq!(targets.len(), 8);
        assert_abs_diff_eq!(targets[0].center.x, BED_REF_POINTS_9[0].x + 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(targets[0].center.y, BED_REF_POINTS_9[0].y - 0.25, epsilon = 1e-5);
    }

    #[test]
    fn xy_is_clamped_to_limits() {
        let mut bed = one_target();
        bed.go_to(Point3::new(-5.0, -20.0, 3.0), 10.0);
        assert_eq!(bed.position(), Point3::new(0.0, -4.0, 3.0));
    }
}
