use nalgebra::{Matrix4, Vector4};

/// Solve `a * x = b` with a fixed number of Gauss-Seidel sweeps from `x = 0`.
///
/// No pivoting; the normal equations of the fit are symmetric positive
/// definite so the sweeps converge. Returns `None` if a diagonal entry is zero.
pub fn gauss_seidel(a: &Matrix4<f64>, b: &Vector4<f64>, sweeps: usize) -> Option<Vector4<f64>> {
    if (0..4).any(|i| a[(i, i)] == 0.0 || !a[(i, i)].is_finite()) {
        return None;
    }

    let mut x = Vector4::zeros();
    for _ in 0..sweeps {
        for i in 0..4 {
            let mut acc = b[i];
            for j in 0..4 {
                if j != i {
                    acc -= a[(i, j)] * x[j];
                }
            }
            x[i] = acc / a[(i, i)];
        }
    }
    Some(x)
}
