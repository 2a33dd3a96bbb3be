use crate::error::QuantInvestError;
use crate::QuantInvestResult;

/// Pivots smaller than this are treated as singular.
const PIVOT_EPSILON: f64 = 1e-14;

/// Matrix-vector multiplication.
pub(crate) fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product.
pub(crate) fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Largest absolute component; zero for an empty vector.
pub(crate) fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

pub(crate) fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

/// Solve `A x = b` by Gauss-Jordan elimination with partial pivoting.
///
/// Pivots are compared against the largest entry of `A` so the singularity
/// test does not depend on the scale of the system.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> QuantInvestResult<Vec<f64>> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(QuantInvestError::invalid(
            "linear_system",
            format!("Expected {}x{} system with {} right-hand values", n, n, b.len()),
        ));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, x| acc.max(x.abs()))
        .max(1.0);

    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(*rhs);
            r
        })
        .collect();

    for col in 0..n {
        // Partial pivoting
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < PIVOT_EPSILON * scale || !max_val.is_finite() {
            return Err(QuantInvestError::NumericalDegeneracy(
                "Singular linear system".into(),
            ));
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_with_pivoting() {
        // First pivot is zero; requires a row swap.
        let a = vec![vec![0.0, 2.0], vec![3.0, 1.0]];
        let x = solve_linear_system(&a, &[4.0, 5.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_system() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let err = solve_linear_system(&a, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, QuantInvestError::NumericalDegeneracy(_)));
    }

    #[test]
    fn test_saddle_point_system() {
        // [[2, 1], [1, 0]] x = [-1, 0] => x = [0, -1]
        let a = vec![vec![2.0, 1.0], vec![1.0, 0.0]];
        let x = solve_linear_system(&a, &[-1.0, 0.0]).unwrap();
        assert!(x[0].abs() < 1e-12);
        assert!((x[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(vec_dot(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(mat_vec_multiply(&identity(2), &[5.0, -6.0]), vec![5.0, -6.0]);
        assert_eq!(max_abs(&[1.0, -7.5, 3.0]), 7.5);
    }
}
