//! Dense real matrices for the portfolio statistics.
//!
//! `Matrix` wraps a `nalgebra::DMatrix<f64>` and exposes the handful of
//! operations the model needs with explicit, fallible signatures: products,
//! elementwise arithmetic, column means, sample covariance and a
//! Cholesky-based inverse.

use std::fmt;
use std::ops::{Index, IndexMut};

use nalgebra::{Cholesky, DMatrix};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    #[error("Matrix dimension mismatch for {operation}: {left:?} vs {right:?}")]
    DimensionMismatch {
        operation: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("All rows must have the same number of columns (row {row} has {found}, expected {expected})")]
    NonRectangular {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("At least {required} rows are required, got {found}")]
    InsufficientData { required: usize, found: usize },
    #[error("Cholesky decomposition requires a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("Matrix is not positive-definite")]
    NotPositiveDefinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: DMatrix<f64>,
}

impl Matrix {
    /// Zero-initialised `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            data: DMatrix::zeros(rows, cols),
        }
    }

    pub fn identity(n: usize) -> Self {
        Matrix {
            data: DMatrix::identity(n, n),
        }
    }

    /// Builds a matrix from row vectors, rejecting ragged input.
    /// An empty slice gives a 0x0 matrix.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, MatrixError> {
        let Some(first) = rows.first() else {
            return Ok(Matrix::zeros(0, 0));
        };
        let cols = first.len();
        if let Some((row, found)) = rows
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|&(_, len)| len != cols)
        {
            return Err(MatrixError::NonRectangular {
                row,
                expected: cols,
                found,
            });
        }

        Ok(Matrix {
            data: DMatrix::from_fn(rows.len(), cols, |i, j| rows[i][j]),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn row(&self, r: usize) -> Vec<f64> {
        self.data.row(r).iter().copied().collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.num_rows()).map(|r| self.row(r)).collect()
    }

    pub fn as_dmatrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn transpose(&self) -> Matrix {
        Matrix {
            data: self.data.transpose(),
        }
    }

    /// Matrix product `self * other`.
    pub fn dot(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if self.num_cols() != other.num_rows() {
            return Err(MatrixError::DimensionMismatch {
                operation: "multiplication",
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(Matrix {
            data: &self.data * &other.data,
        })
    }

    pub fn scale(&self, scalar: f64) -> Matrix {
        Matrix {
            data: &self.data * scalar,
        }
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape(other, "addition")?;
        Ok(Matrix {
            data: &self.data + &other.data,
        })
    }

    pub fn subtract(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape(other, "subtraction")?;
        Ok(Matrix {
            data: &self.data - &other.data,
        })
    }

    fn check_same_shape(&self, other: &Matrix, operation: &'static str) -> Result<(), MatrixError> {
        if self.shape() != other.shape() {
            return Err(MatrixError::DimensionMismatch {
                operation,
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    /// Arithmetic mean of each column. Empty when the matrix has no rows or no columns.
    pub fn mean_per_column(&self) -> Vec<f64> {
        let (rows, cols) = self.shape();
        if rows == 0 || cols == 0 {
            return vec![];
        }
        self.data
            .column_iter()
            .map(|column| column.sum() / rows as f64)
            .collect()
    }

    /// Unbiased sample covariance of the columns (denominator `rows - 1`).
    ///
    /// Only the upper triangle is computed; the lower one is mirrored so the
    /// result is exactly symmetric.
    pub fn covariance_matrix(&self) -> Result<Matrix, MatrixError> {
        let (rows, cols) = self.shape();
        if rows < 2 {
            return Err(MatrixError::InsufficientData {
                required: 2,
                found: rows,
            });
        }

        let means = self.mean_per_column();
        let mut centered = self.data.clone();
        for (mut column, mean) in centered.column_iter_mut().zip(means.iter()) {
            column.add_scalar_mut(-mean);
        }

        let denominator = (rows - 1) as f64;
        let mut cov = DMatrix::zeros(cols, cols);
        for i in 0..cols {
            for j in i..cols {
                let value = centered.column(i).dot(&centered.column(j)) / denominator;
                cov[(i, j)] = value;
                cov[(j, i)] = value;
            }
        }
        Ok(Matrix { data: cov })
    }

    /// Lower-triangular `L` with `L * L^T == self`.
    ///
    /// Only the lower triangle of `self` is read, so the input is assumed symmetric.
    pub fn cholesky_decompose(&self) -> Result<Matrix, MatrixError> {
        let (rows, cols) = self.shape();
        if rows != cols {
            return Err(MatrixError::NotSquare { rows, cols });
        }
        let cholesky = Cholesky::new(self.data.clone()).ok_or(MatrixError::NotPositiveDefinite)?;
        Ok(Matrix { data: cholesky.l() })
    }

    /// Inverse of a symmetric positive-definite matrix: `(L^-1)^T * L^-1`,
    /// where `L^-1` comes from forward substitution against the identity.
    pub fn inverse(&self) -> Result<Matrix, MatrixError> {
        let l = self.cholesky_decompose()?.data;
        let n = l.nrows();
        let inv_l = l
            .solve_lower_triangular(&DMatrix::identity(n, n))
            .ok_or(MatrixError::NotPositiveDefinite)?;
        Ok(Matrix {
            data: inv_l.transpose() * &inv_l,
        })
    }
}

impl From<DMatrix<f64>> for Matrix {
    fn from(data: DMatrix<f64>) -> Self {
        Matrix { data }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &f64 {
        &self.data[index]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut f64 {
        &mut self.data[index]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.data.row_iter() {
            for value in row.iter() {
                write!(f, "{:>12.6} ", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn spd() -> Matrix {
        Matrix::from_rows(&[
            vec![4.0, 12.0, -16.0],
            vec![12.0, 37.0, -43.0],
            vec![-16.0, -43.0, 98.0],
        ])
        .unwrap()
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::NonRectangular {
                row: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn transpose_and_dot() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let at = a.transpose();
        assert_eq!(at.shape(), (3, 2));
        assert_eq!(at[(2, 1)], 6.0);

        let product = a.dot(&at).unwrap();
        assert_eq!(product.shape(), (2, 2));
        assert_eq!(product[(0, 0)], 14.0);
        assert_eq!(product[(0, 1)], 32.0);
        assert_eq!(product[(1, 1)], 77.0);

        assert!(matches!(
            a.dot(&a),
            Err(MatrixError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn elementwise_arithmetic_checks_shapes() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = a.scale(2.0);
        assert_eq!(a.add(&b).unwrap()[(1, 1)], 12.0);
        assert_eq!(b.subtract(&a).unwrap()[(0, 1)], 2.0);

        let c = Matrix::zeros(3, 2);
        assert!(a.add(&c).is_err());
        assert!(a.subtract(&c).is_err());
    }

    #[test]
    fn column_means_and_empty_matrix() {
        let a = Matrix::from_rows(&[vec![1.0, 10.0], vec![3.0, 20.0]]).unwrap();
        assert_eq!(a.mean_per_column(), vec![2.0, 15.0]);
        assert!(Matrix::zeros(0, 0).mean_per_column().is_empty());
        assert!(Matrix::from_rows(&[]).unwrap().mean_per_column().is_empty());
    }

    #[test]
    fn covariance_is_unbiased_and_symmetric() {
        let returns = Matrix::from_rows(&[
            vec![0.01, 0.02, -0.01],
            vec![0.03, -0.01, 0.00],
            vec![-0.02, 0.04, 0.02],
            vec![0.00, 0.01, 0.01],
        ])
        .unwrap();
        let cov = returns.covariance_matrix().unwrap();

        // first column: mean 0.005, squared deviations sum to 0.0013
        assert_abs_diff_eq!(cov[(0, 0)], 0.0013 / 3.0, epsilon = 1e-15);
        for i in 0..3 {
            assert!(cov[(i, i)] >= 0.0);
            for j in 0..3 {
                assert_eq!(cov[(i, j)], cov[(j, i)]);
            }
        }
    }

    #[test]
    fn covariance_needs_two_rows() {
        let single = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        assert_eq!(
            single.covariance_matrix().unwrap_err(),
            MatrixError::InsufficientData {
                required: 2,
                found: 1
            }
        );
    }

    #[test]
    fn cholesky_reconstructs_spd_input() {
        let a = spd();
        let l = a.cholesky_decompose().unwrap();
        assert_abs_diff_eq!(l[(0, 0)], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[(2, 1)], 5.0, epsilon = 1e-12);
        assert_eq!(l[(0, 2)], 0.0);

        let rebuilt = l.dot(&l.transpose()).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(rebuilt[(i, j)], a[(i, j)], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn cholesky_rejects_non_spd_and_non_square() {
        let indefinite = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap();
        assert_eq!(
            indefinite.cholesky_decompose().unwrap_err(),
            MatrixError::NotPositiveDefinite
        );

        let negative_diagonal = Matrix::from_rows(&[vec![-1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(
            negative_diagonal.inverse().unwrap_err(),
            MatrixError::NotPositiveDefinite
        );

        assert_eq!(
            Matrix::zeros(2, 3).cholesky_decompose().unwrap_err(),
            MatrixError::NotSquare { rows: 2, cols: 3 }
        );
    }

    #[test]
    fn inverse_times_input_is_identity() {
        let a = spd();
        let product = a.dot(&a.inverse().unwrap()).unwrap();
        let identity = Matrix::identity(3);
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(product[(i, j)], identity[(i, j)], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn display_uses_fixed_width_columns() {
        let a = Matrix::from_rows(&[vec![1.0, -0.5]]).unwrap();
        assert_eq!(a.to_string(), "    1.000000    -0.500000 \n");
    }
}
