//! small dense solvers shared by the cox & logistic newton steps

use ndarray::{Array1, Array2};

use crate::error::{Result, SurvivalError};

/// pivots smaller than this mean the matrix is singular for our purposes
const SINGULAR_PIVOT: f64 = 1e-12;

/// Solve `a x = b` with partial-pivot gaussian elimination.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SurvivalError::invalid_dimensions("matrix dimensions mismatch"));
    }

    let mut a = a.clone();
    let mut b = b.clone();

    // forward elimination
    for i in 0..n {
        let pivot = pivot_row(&a, i);
        if a[[pivot, i]].abs() < SINGULAR_PIVOT {
            return Err(SurvivalError::numerical_error(format!(
                "matrix is singular (column {i})"
            )));
        }
        if pivot != i {
            swap_rows(&mut a, i, pivot);
            b.swap(i, pivot);
        }

        for k in i + 1..n {
            let factor = a[[k, i]] / a[[i, i]];
            for j in i..n {
                a[[k, j]] -= factor * a[[i, j]];
            }
            b[k] -= factor * b[i];
        }
    }

    // back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b[i];
        for j in i + 1..n {
            x[i] -= a[[i, j]] * x[j];
        }
        x[i] /= a[[i, i]];
    }

    Ok(x)
}

/// Invert a square matrix with gauss-jordan elimination.
pub fn invert(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(SurvivalError::invalid_dimensions("can only invert square matrices"));
    }

    let mut a = a.clone();
    let mut inv = Array2::eye(n);

    for i in 0..n {
        let pivot = pivot_row(&a, i);
        if a[[pivot, i]].abs() < SINGULAR_PIVOT {
            return Err(SurvivalError::numerical_error(format!(
                "matrix is singular (column {i})"
            )));
        }
        if pivot != i {
            swap_rows(&mut a, i, pivot);
            swap_rows(&mut inv, i, pivot);
        }

        let diag = a[[i, i]];
        for j in 0..n {
            a[[i, j]] /= diag;
            inv[[i, j]] /= diag;
        }

        for k in 0..n {
            if k == i {
                continue;
            }
            let factor = a[[k, i]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[[k, j]] -= factor * a[[i, j]];
                inv[[k, j]] -= factor * inv[[i, j]];
            }
        }
    }

    Ok(inv)
}

fn pivot_row(a: &Array2<f64>, col: usize) -> usize {
    let mut max_row = col;
    for k in col + 1..a.nrows() {
        if a[[k, col]].abs() > a[[max_row, col]].abs() {
            max_row = k;
        }
    }
    max_row
}

fn swap_rows(a: &mut Array2<f64>, i: usize, j: usize) {
    for c in 0..a.ncols() {
        a.swap([i, c], [j, c]);
    }
}
