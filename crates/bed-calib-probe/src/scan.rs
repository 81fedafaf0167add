use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::motion::Motion;
use crate::prober::Prober;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSide {
    /// Hit while sweeping towards +X.
    Left,
    /// Hit while sweeping towards -X.
    Right,
}

/// One trigger edge recorded by [`Prober::scan_point`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanEdge {
    pub side: EdgeSide,
    pub position: Point3<f32>,
}

impl<M: Motion + ?Sized> Prober<'_, M> {
    /// Sweep X chords over the zig-zag window around the current point and
    /// record every trigger edge. Returns to the start point afterwards.
    pub fn scan_point(&mut self) -> Vec<ScanEdge> {
        self.with_switches(false, |p| {
            let old = p.pos.xy();
            let r = p.params.zigzag_radius;
            let step = p.params.fine_step_y;
            let (x0, x1) = p.span_x(old.x, r);
            let (y0, y1) = p.span_y(old.y, r);
            let lines = ((y1 - y0) / step).ceil() as usize;

            let mut edges = Vec::new();
            for i in 0..lines {
                let y = y0 + i as f32 * step;
                for (side, from, to) in [(EdgeSide::Left, x0, x1), (EdgeSide::Right, x1, x0)] {
                    if p.approach(Point2::new(from, y), Point2::new(to, y)).is_some() {
                        let position = p.pos;
                        log::info!(
                            "measured {} {:.5}, {:.5}, {:.5}",
                            if side == EdgeSide::Left { "left" } else { "right" },
                            position.x,
                            position.y,
                            position.z
                        );
                        edges.push(ScanEdge { side, position });
                    }
                }
            }

            p.go_xy(old.x, old.y);
            edges
        })
    }
}
