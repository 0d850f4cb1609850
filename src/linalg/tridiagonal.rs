use super::LinAlgError;
use ndarray::{Array1, ArrayView1};

/// Solve a tridiagonal system with the Thomas algorithm.
///
/// `a` is the sub-diagonal, `b` the diagonal, `c` the super-diagonal and `r`
/// the right-hand side, all of length `n` with `a[0]` and `c[n - 1]` unused.
/// The forward sweep maintains a running pivot; a pivot of exactly zero means
/// the elimination broke down and the function fails instead of dividing
/// through it.
pub fn tridiagonal_solve(
    a: ArrayView1<f64>,
    b: ArrayView1<f64>,
    c: ArrayView1<f64>,
    r: ArrayView1<f64>,
) -> Result<Array1<f64>, LinAlgError> {
    let n = b.len();
    for len in [a.len(), c.len(), r.len()] {
        if len != n {
            return Err(LinAlgError::ShapeMismatch(len, 1, n, 1));
        }
    }
    if n == 0 {
        return Ok(Array1::zeros(0));
    }

    let mut u = Array1::zeros(n);
    let mut gam = Array1::zeros(n);

    let mut bet = b[0];
    if bet == 0.0 {
        return Err(LinAlgError::SingularMatrix);
    }
    u[0] = r[0] / bet;
    for j in 1..n {
        gam[j] = c[j - 1] / bet;
        bet = b[j] - a[j] * gam[j];
        if bet == 0.0 {
            return Err(LinAlgError::SingularMatrix);
        }
        u[j] = (r[j] - a[j] * u[j - 1]) / bet;
    }
    for j in (0..n - 1).rev() {
        u[j] -= gam[j + 1] * u[j + 1];
    }
    Ok(u)
}
