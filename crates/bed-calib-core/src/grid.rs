//! Compiled-in reference target positions.
//!
//! Positions are in world coordinates, referenced to the probe (not the
//! nozzle). The printed bed coordinates of the targets are shifted by the
//! sensor zero reference [`BED_ZERO_REF`].

use nalgebra::Point2;

/// Probe zero reference: `(-22 + 23, -0.6 + 9)`, i.e. the bed origin offset
/// combined with the probe offset from the extruder.
pub const BED_ZERO_REF: [f32; 2] = [1.0, 8.4];

const X_LEFT: f32 = 13.0 - BED_ZERO_REF[0];
const X_MID: f32 = 115.0 - BED_ZERO_REF[0];
const X_RIGHT: f32 = 216.0 - BED_ZERO_REF[0];
const Y_FRONT: f32 = 6.4 - BED_ZERO_REF[1];
const Y_MID: f32 = 104.4 - BED_ZERO_REF[1];
const Y_REAR: f32 = 202.4 - BED_ZERO_REF[1];

/// Nine reference targets in zig-zag order: front row left to right, middle
/// row right to left, rear row left to right.
pub const BED_REF_POINTS_9: [Point2<f32>; 9] = [
    Point2::new(X_LEFT, Y_FRONT),
    Point2::new(X_MID, Y_FRONT),
    Point2::new(X_RIGHT, Y_FRONT),
    Point2::new(X_RIGHT, Y_MID),
    Point2::new(X_MID, Y_MID),
    Point2::new(X_LEFT, Y_MID),
    Point2::new(X_LEFT, Y_REAR),
    Point2::new(X_MID, Y_REAR),
    Point2::new(X_RIGHT, Y_REAR),
];

/// Four reference targets: center front, center right, center rear, center left.
pub const BED_REF_POINTS_4: [Point2<f32>; 4] = [
    Point2::new(X_MID, Y_FRONT),
    Point2::new(X_RIGHT, Y_MID),
    Point2::new(X_MID, Y_REAR),
    Point2::new(X_LEFT, Y_MID),
];

/// Number of leading points in either grid that belong to the front row
/// (or are treated like it by the solver weighting).
pub const FIRST_ROW_POINTS: usize = 3;

pub const MESH_COLS: usize = 3;
pub const MESH_ROWS: usize = 3;

/// Map a zig-zag refined-grid index to `(column, row)` of the 3x3 mesh.
#[inline]
pub fn mesh_cell(index: usize) -> (usize, usize) {
    let row = index / MESH_COLS;
    let mut col = index % MESH_COLS;
    if row % 2 == 1 {
        col = MESH_COLS - 1 - col;
    }
    (col, row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refined_grid_is_zig_zag() {
        for (k, p) in BED_REF_POINTS_9.iter().enumerate() {
            let (col, row) = mesh_cell(k);
            let xs = [X_LEFT, X_MID, X_RIGHT];
            let ys = [Y_FRONT, Y_MID, Y_REAR];
            assert_eq!(p.x, xs[col], "point {k} column");
            assert_eq!(p.y, ys[row], "point {k} row");
        }
    }

    #[test]
    fn mesh_cells_cover_grid_once() {
        let mut seen = [[false; MESH_COLS]; MESH_ROWS];
        for k in 0..MESH_COLS * MESH_ROWS {
            let (c, r) = mesh_cell(k);
            assert!(!seen[r][c]);
            seen[r][c] = true;
        }
        assert!(seen.iter().flatten().all(|&s| s));
    }

    #[test]
    fn coarse_grid_is_subset_of_refined_grid() {
        for p in BED_REF_POINTS_4 {
            assert!(BED_REF_POINTS_9.contains(&p));
        }
    }
}
