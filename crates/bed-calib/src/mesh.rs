use bed_calib_core::MESH_COLS;
use serde::{Deserialize, Serialize};

use crate::collab::MeshGrid;

/// Side of the leveling grid after upsampling.
pub const UPSAMPLED_SIZE: usize = 7;

/// In-memory square height grid, 3x3 until upsampled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridMesh {
    size: usize,
    z: Vec<f32>,
    active: bool,
}

impl Default for GridMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl GridMesh {
    pub fn new() -> Self {
        Self {
            size: MESH_COLS,
            z: vec![0.0; MESH_COLS * MESH_COLS],
            active: false,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sample at node `(i, j)` of the current grid.
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> f32 {
        self.z[j * self.size + i]
    }

    /// Row-major samples.
    pub fn values(&self) -> &[f32] {
        &self.z
    }

    fn node(&self, logical: usize) -> usize {
        logical * (self.size - 1) / (MESH_COLS - 1)
    }
}

impl MeshGrid for GridMesh {
    fn clear(&mut self) {
        *self = Self::new();
    }

    fn set_z(&mut self, col: usize, row: usize, z: f32) {
        let (i, j) = (self.node(col), self.node(row));
        let n = self.size;
        self.z[j * n + i] = z;
    }

    fn z(&self, col: usize, row: usize) -> f32 {
        self.at(self.node(col), self.node(row))
    }

    /// Bilinear interpolation of the 3x3 samples. No-op once upsampled.
    fn upsample(&mut self) {
        if self.size != MESH_COLS {
            return;
        }
        let coarse = self.z.clone();
        let n = UPSAMPLED_SIZE;
        let last = (MESH_COLS - 1) as f32;
        let sample = |i: usize, j: usize| coarse[j * MESH_COLS + i];

        let mut z = vec![0.0; n * n];
        for j in 0..n {
            let v = j as f32 * last / (n - 1) as f32;
            let j0 = (v.floor() as usize).min(MESH_COLS - 2);
            let fv = v - j0 as f32;
            for i in 0..n {
                let u = i as f32 * last / (n - 1) as f32;
                let i0 = (u.floor() as usize).min(MESH_COLS - 2);
                let fu = u - i0 as f32;
                let bottom = sample(i0, j0) * (1.0 - fu) + sample(i0 + 1, j0) * fu;
                let top = sample(i0, j0 + 1) * (1.0 - fu) + sample(i0 + 1, j0 + 1) * fu;
                z[j * n + i] = bottom * (1.0 - fv) + top * fv;
            }
        }
        self.size = n;
        self.z = z;
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn plane() -> GridMesh {
        let mut mesh = GridMesh::new();
        for row in 0..3 {
            for col in 0..3 {
                mesh.set_z(col, row, 0.1 * col as f32 + 0.2 * row as f32);
            }
        }
        mesh
    }

    #[test]
    fn upsampling_keeps_samples_and_interpolates_planes() {
        let mut mesh = plane();
        mesh.upsample();
        assert_eq!(mesh.size(), UPSAMPLED_SIZE);
        for row in 0..3 {
            for col in 0..3 {
                assert_abs_diff_eq!(
                    mesh.z(col, row),
                    0.1 * col as f32 + 0.2 * row as f32,
                    epsilon = 1e-6
                );
            }
        }
        // Node 1 of 7 sits a third of the way to the middle sample.
        assert_abs_diff_eq!(mesh.at(1, 0), 0.1 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(mesh.at(6, 6), 0.6, epsilon = 1e-6);
    }

    #[test]
    fn second_upsample_is_a_no_op() {
        let mut mesh = plane();
        mesh.upsample();
        let once = mesh.clone();
        mesh.upsample();
        assert_eq!(mesh, once);
    }

    #[test]
    fn clear_restores_the_coarse_grid() {
        let mut mesh = plane();
        mesh.upsample();
        mesh.set_active(true);
        mesh.clear();
        assert_eq!(mesh, GridMesh::new());
    }
}
