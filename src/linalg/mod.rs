//! Dense linear algebra for the small systems solved in every equilibrium
//! iteration.
//!
//! All matrices passed into this module are `(NELE + 1) × (NELE + 1)` or
//! smaller, with `NELE` bounded by the number of chemical elements in the
//! mixture. The routines are written for clarity and predictable failure on
//! singular input, not for performance. Transposition, scaling and
//! elementwise arithmetic come directly from `ndarray`; this module only
//! adds the operations that need explicit failure handling.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

mod tridiagonal;
pub use tridiagonal::tridiagonal_solve;

const POWER_ITERATIONS: usize = 100;

/// Error type for the dense linear algebra routines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinAlgError {
    #[error("The matrix appears to be singular.")]
    SingularMatrix,
    #[error("The operation requires a square matrix.")]
    NotSquare,
    #[error("Incompatible shapes: ({0}, {1}) and ({2}, {3}).")]
    ShapeMismatch(usize, usize, usize, usize),
}

/// Matrix product with an explicit shape check.
pub fn multiply(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Result<Array2<f64>, LinAlgError> {
    if a.ncols() != b.nrows() {
        return Err(LinAlgError::ShapeMismatch(
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols(),
        ));
    }
    Ok(a.dot(&b))
}

/// Matrix inversion by Gauss-Jordan elimination on an identity-augmented
/// matrix.
///
/// Uses partial pivoting. If the best available pivot in a column is exactly
/// zero the matrix is singular and the function fails instead of producing
/// NaN or infinite entries.
pub fn invert(a: ArrayView2<f64>) -> Result<Array2<f64>, LinAlgError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinAlgError::NotSquare);
    }

    let mut aug = Array2::zeros((n, 2 * n));
    aug.slice_mut(ndarray::s![.., ..n]).assign(&a);
    for i in 0..n {
        aug[(i, n + i)] = 1.0;
    }

    for col in 0..n {
        let mut pivot_row = col;
        for row in col + 1..n {
            if aug[(row, col)].abs() > aug[(pivot_row, col)].abs() {
                pivot_row = row;
            }
        }
        if aug[(pivot_row, col)] == 0.0 {
            return Err(LinAlgError::SingularMatrix);
        }
        if pivot_row != col {
            for k in 0..2 * n {
                aug.swap((col, k), (pivot_row, k));
            }
        }

        let pivot = aug[(col, col)];
        for k in 0..2 * n {
            aug[(col, k)] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[(row, col)];
            if factor != 0.0 {
                for k in 0..2 * n {
                    aug[(row, k)] -= factor * aug[(col, k)];
                }
            }
        }
    }

    Ok(aug.slice(ndarray::s![.., n..]).to_owned())
}

/// Determinant by recursive cofactor expansion along the first row.
///
/// The cost grows factorially with the matrix dimension. That is acceptable
/// here because the solver never builds systems larger than
/// `(NELE + 1) × (NELE + 1)`; do not use this as a general purpose routine.
pub fn determinant(a: ArrayView2<f64>) -> Result<f64, LinAlgError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinAlgError::NotSquare);
    }
    Ok(match n {
        0 => 1.0,
        1 => a[(0, 0)],
        2 => a[(0, 0)] * a[(1, 1)] - a[(0, 1)] * a[(1, 0)],
        _ => {
            let mut det = 0.0;
            let mut sign = 1.0;
            for j in 0..n {
                if a[(0, j)] != 0.0 {
                    let minor = Array2::from_shape_fn((n - 1, n - 1), |(r, c)| {
                        a[(r + 1, if c < j { c } else { c + 1 })]
                    });
                    det += sign * a[(0, j)] * determinant(minor.view())?;
                }
                sign = -sign;
            }
            det
        }
    })
}

/// Dominant eigenvector by power iteration.
///
/// Runs a fixed number of iterations (100 by default), normalizing the
/// iterate at every step. Only the dominant eigenvector is returned; there is
/// no deflation for subsequent eigenvectors and no eigenvalue estimate.
pub fn dominant_eigenvector(
    a: ArrayView2<f64>,
    iterations: Option<usize>,
) -> Result<Array1<f64>, LinAlgError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinAlgError::NotSquare);
    }
    let mut x = Array1::from_elem(n, 1.0 / (n as f64).sqrt());
    for _ in 0..iterations.unwrap_or(POWER_ITERATIONS) {
        let y = a.dot(&x);
        let norm = y.dot(&y).sqrt();
        if norm == 0.0 {
            return Err(LinAlgError::SingularMatrix);
        }
        x = y / norm;
    }
    Ok(x)
}

/// Solve the linear system `a x = b` through inversion.
pub fn solve(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>, LinAlgError> {
    if a.nrows() != b.len() {
        return Err(LinAlgError::ShapeMismatch(a.nrows(), a.ncols(), b.len(), 1));
    }
    Ok(invert(a)?.dot(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn multiply_checks_shapes() {
        let a = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let b = arr2(&[[1.0], [1.0], [1.0]]);
        assert_eq!(
            multiply(a.view(), b.view()),
            Err(LinAlgError::ShapeMismatch(2, 2, 3, 1))
        );
    }

    #[test]
    fn invert_round_trip() -> Result<(), LinAlgError> {
        let a = arr2(&[[4.0, 7.0, 2.0], [3.0, 6.0, 1.0], [2.0, 5.0, 3.0]]);
        let a_inv = invert(a.view())?;
        let identity = multiply(a.view(), a_inv.view())?;
        assert_relative_eq!(identity, Array2::eye(3), epsilon = 1e-12);
        let a_again = invert(a_inv.view())?;
        assert_relative_eq!(a_again, a, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn invert_requires_pivoting() -> Result<(), LinAlgError> {
        // zero in the (0, 0) position, still regular
        let a = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let a_inv = invert(a.view())?;
        assert_relative_eq!(a_inv, a, epsilon = 1e-15);
        Ok(())
    }

    #[test]
    fn invert_pivots_on_largest_entry() -> Result<(), LinAlgError> {
        // without row exchange the tiny leading entry would amplify
        // roundoff far beyond the asserted tolerance
        let a = arr2(&[[1e-13, 1.0], [1.0, 1.0]]);
        let a_inv = invert(a.view())?;
        let identity = multiply(a.view(), a_inv.view())?;
        assert_relative_eq!(identity, Array2::eye(2), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn invert_singular_fails() {
        let a = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        assert_eq!(invert(a.view()), Err(LinAlgError::SingularMatrix));
    }

    #[test]
    fn determinant_cofactor_expansion() -> Result<(), LinAlgError> {
        let a = arr2(&[[2.0, 0.0, 1.0], [1.0, 3.0, 2.0], [1.0, 1.0, 2.0]]);
        assert_relative_eq!(determinant(a.view())?, 6.0, epsilon = 1e-14);
        let b = arr2(&[
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 3.0, 0.0],
            [0.0, 0.0, 0.0, 4.0],
        ]);
        assert_relative_eq!(determinant(b.view())?, 24.0, epsilon = 1e-14);
        Ok(())
    }

    #[test]
    fn determinant_of_singular_matrix_is_zero() -> Result<(), LinAlgError> {
        // last row is a linear combination of the first two
        let a = arr2(&[[2.0, 0.0, 1.0], [1.0, 3.0, 2.0], [1.0, 1.0, 1.0]]);
        assert_relative_eq!(determinant(a.view())?, 0.0, epsilon = 1e-14);
        Ok(())
    }

    #[test]
    fn power_iteration_dominant_eigenvector() -> Result<(), LinAlgError> {
        // eigenvalues 3 and 1, dominant eigenvector (1, 1)/sqrt(2)
        let a = arr2(&[[2.0, 1.0], [1.0, 2.0]]);
        let v = dominant_eigenvector(a.view(), None)?;
        let expected = 1.0 / 2.0_f64.sqrt();
        assert_relative_eq!(v[0].abs(), expected, epsilon = 1e-10);
        assert_relative_eq!(v[1].abs(), expected, epsilon = 1e-10);
        // residual of the eigen equation
        let av = a.dot(&v);
        let lambda = v.dot(&av);
        assert_relative_eq!(av, v.mapv(|x| lambda * x), epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn solve_small_system() -> Result<(), LinAlgError> {
        let a = arr2(&[[3.0, 1.0], [1.0, 2.0]]);
        let b = arr1(&[9.0, 8.0]);
        let x = solve(a.view(), b.view())?;
        assert_relative_eq!(a.dot(&x), b, epsilon = 1e-12);
        Ok(())
    }
}
