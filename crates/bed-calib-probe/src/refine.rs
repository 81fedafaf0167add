//! Center refinement around an already acquired target.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, SearchPhase};
use crate::motion::Motion;
use crate::prober::Prober;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Outcome of a successful refinement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Ok,
    /// Found, but the true center lies beyond the reachable Y range.
    Far,
}

/// Refinement used for the points outside the first row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineStrategy {
    /// Approach along four diagonals and average the trigger positions.
    Star,
    /// X bisection followed by Y bisection.
    #[default]
    Cross,
}

const DIAGONAL: f32 = 0.707;

impl<M: Motion + ?Sized> Prober<'_, M> {
    /// Refine with the given strategy. Both report [`PointStatus::Ok`].
    pub fn improve(&mut self, strategy: RefineStrategy) -> Result<PointStatus, ProbeError> {
        match strategy {
            RefineStrategy::Star => self.improve_star(),
            RefineStrategy::Cross => self.improve_cross(),
        }
        .map(|_| PointStatus::Ok)
    }

    /// Approach the current point from four diagonal directions.
    ///
    /// The diagonal start points are pulled in along their ray to stay inside
    /// the travel limits. Fails unless all four approaches trigger.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn improve_star(&mut self) -> Result<Point2<f32>, ProbeError> {
        self.with_switches(false, |p| {
            let center = p.pos.xy();
            let r = p.params.star_radius * DIAGONAL;
            let dirs = [
                Vector2::new(-r, -r),
                Vector2::new(r, r),
                Vector2::new(r, -r),
                Vector2::new(-r, r),
            ];

            let mut sum = Vector2::<f32>::zeros();
            for dir in dirs {
                let start = center + dir * p.ray_scale(center, dir);
                match p.approach(start, center) {
                    Some(hit) => {
                        if p.verbosity >= 5 {
                            log::debug!("measured star {:.5}, {:.5}, {:.5}", hit.x, hit.y, p.pos.z);
                        }
                        sum += hit.coords;
                    }
                    None => {
                        p.go_xy(center.x, center.y);
                        return Err(ProbeError::not_found(SearchPhase::Star));
                    }
                }
            }

            let c = Point2::from(sum / 4.0);
            p.go_xy(c.x, c.y);
            Ok(c)
        })
    }

    /// Largest `t <= 1` keeping `c + t·dir` inside the XY limits.
    fn ray_scale(&self, c: Point2<f32>, dir: Vector2<f32>) -> f32 {
        let l = &self.limits;
        let mut t = 1.0_f32;
        let end = c + dir;
        if end.x < l.x_min && dir.x != 0.0 {
            t = t.min((l.x_min - c.x) / dir.x);
        } else if end.x > l.x_max && dir.x != 0.0 {
            t = t.min((l.x_max - c.x) / dir.x);
        }
        if end.y < l.y_min && dir.y != 0.0 {
            t = t.min((l.y_min - c.y) / dir.y);
        } else if end.y > l.y_max && dir.y != 0.0 {
            t = t.min((l.y_max - c.y) / dir.y);
        }
        t.max(0.0)
    }

    /// Bisect the center along X, then along Y, through the current point.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn improve_cross(&mut self) -> Result<Point2<f32>, ProbeError> {
        self.with_switches(false, |p| {
            let old = p.pos.xy();
            let r = p.params.cross_radius;

            let (x0, x1) = p.span_x(old.x, r);
            let y = old.y;
            let Some((a, b)) = p.chord(y, x0, x1) else {
                p.go_xy(old.x, old.y);
                return Err(ProbeError::not_found(SearchPhase::CrossX));
            };
            let x = 0.5 * (a + b);
            p.go_xy(x, y);

            let (y0, y1) = p.span_y(old.y, r);
            let ends = match p.approach(Point2::new(x, y0), Point2::new(x, y1)) {
                Some(a) => p
                    .approach(Point2::new(x, y1), Point2::new(x, y0))
                    .map(|b| (a, b)),
                None => None,
            };
            let Some((a, b)) = ends else {
                p.go_xy(x, old.y);
                return Err(ProbeError::not_found(SearchPhase::CrossY));
            };
            if p.verbosity >= 5 {
                log::debug!("measured top {:.5}, {:.5}, {:.5}", x, a.y, p.pos.z);
                log::debug!("measured bottom {:.5}, {:.5}, {:.5}", x, b.y, p.pos.z);
            }
            let y = 0.5 * (a.y + b.y);
            p.go_xy(x, y);
            Ok(Point2::new(x, y))
        })
    }

    /// Refine a target whose Y approach is blocked by the front travel limit.
    ///
    /// Scans X chords upwards in fine Y steps until the chord width stops
    /// growing, rescans downwards from 1 mm above the widest chord and
    /// combines both maxima, then re-bisects X. Reports [`PointStatus::Far`]
    /// when the widest chord lies on the clamped front limit itself.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn improve_zigzag(&mut self) -> Result<PointStatus, ProbeError> {
        self.with_switches(false, |p| {
            let old = p.pos.xy();
            let r = p.params.zigzag_radius;
            let step = p.params.fine_step_y;
            let (x0, x1) = p.span_x(old.x, r);
            let (y0, y1) = p.span_y(old.y, r);
            let front_clamped = y0 > old.y - r;

            if p.verbosity >= 20 {
                log::trace!("zig-zag start {:.5}, {:.5}", old.x, old.y);
            }

            // Upwards until the chord narrows again.
            let n_up = ((y1 - y0) / step).ceil() as usize;
            let mut up: Option<(usize, f32, f32)> = None;
            for i in 0..n_up {
                let y = y0 + i as f32 * step;
                let Some((a, b)) = p.chord(y, x0, x1) else {
                    continue;
                };
                let d = b - a;
                match up {
                    Some((_, _, dmax)) if d <= dmax => break,
                    _ => up = Some((i, 0.5 * (a + b), d)),
                }
            }
            let Some((best_i, xmax1, _)) = up else {
                log::debug!("zig-zag: target not found");
                p.go_xy(old.x, old.y);
                return Err(ProbeError::not_found(SearchPhase::ZigZag));
            };
            let y_best1 = y0 + best_i as f32 * step;

            // Downwards from 1 mm above the widest chord.
            let y_top = (y_best1 + 1.0).min(y1);
            let n_down = ((y_top - y_best1) / step).round() as usize;
            let mut down: Option<(f32, f32, f32)> = None;
            for i in 0..=n_down {
                let y = y_top - i as f32 * step;
                let Some((a, b)) = p.chord(y, x0, x1) else {
                    continue;
                };
                let d = b - a;
                match down {
                    Some((_, _, dmax)) if d <= dmax => break,
                    _ => down = Some((y, 0.5 * (a + b), d)),
                }
            }

            let mut far = front_clamped && best_i == 0;
            let (x, y) = match down {
                None => {
                    far = true;
                    (xmax1, y_best1)
                }
                Some((y_best2, xmax2, _)) => {
                    // A maximum on the travel limit is weighted higher.
                    let w = if front_clamped && best_i == 0 { 0.75 } else { 0.5 };
                    (
                        w * xmax1 + (1.0 - w) * xmax2,
                        w * y_best1 + (1.0 - w) * y_best2,
                    )
                }
            };
            if p.verbosity >= 20 {
                log::trace!("zig-zag adjusted {:.5}, {:.5}", x, y);
            }
            p.go_xy(x, y);

            let (cx0, cx1) = p.span_x(x, p.params.cross_radius);
            let Some((a, b)) = p.chord(y, cx0, cx1) else {
                p.go_xy(old.x, y);
                return Err(ProbeError::not_found(SearchPhase::ZigZagCross));
            };
            let x = 0.5 * (a + b);
            p.go_xy(x, y);

            Ok(if far { PointStatus::Far } else { PointStatus::Ok })
        })
    }
}
