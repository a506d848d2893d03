//! Dense row-major matrices backing the feed-forward controller.
//!
//! Arithmetic (`add`, `multiply`, `map` and the activation helpers) always
//! allocates a fresh result. [`Matrix::reconstruct`] is the only operation that
//! writes into an existing matrix.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BrainError;

/// Logistic sigmoid `1 / (1 + e^-x)`.
#[must_use]
pub fn logistic(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

/// Rectangular grid of reals stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Matrix of the given shape filled with zeros.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Matrix with entries drawn uniformly from `[-range, range)`.
    ///
    /// A non-positive range yields a zero matrix.
    #[must_use]
    pub fn random(rows: usize, cols: usize, range: f64, rng: &mut dyn RngCore) -> Self {
        let mut matrix = Self::zeros(rows, cols);
        if range > 0.0 {
            for value in &mut matrix.data {
                *value = rng.random_range(-range..range);
            }
        }
        matrix
    }

    /// Build a matrix from nested rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, BrainError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(BrainError::ArityMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Column vector (`n x 1`) holding `values`.
    #[must_use]
    pub fn column(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of entries (`rows * cols`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entry at `(row, col)`, if in range.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Row-major view of the entries.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Self) -> Result<Self, BrainError> {
        if self.shape() != other.shape() {
            return Err(BrainError::ShapeMismatch {
                op: "add",
                left: self.shape(),
                right: other.shape(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Matrix product `self * other`.
    pub fn multiply(&self, other: &Self) -> Result<Self, BrainError> {
        if self.cols != other.rows {
            return Err(BrainError::ShapeMismatch {
                op: "multiply",
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut product = Self::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self.data[i * self.cols + k];
                if lhs == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    product.data[i * other.cols + j] += lhs * other.data[k * other.cols + j];
                }
            }
        }
        Ok(product)
    }

    /// Apply `func` to every entry, returning a new matrix.
    #[must_use]
    pub fn map(&self, func: impl Fn(f64) -> f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&value| func(value)).collect(),
        }
    }

    #[must_use]
    pub fn sigmoid(&self) -> Self {
        self.map(logistic)
    }

    /// Sigmoid scaled into `[0, amplitude]`.
    #[must_use]
    pub fn scaled_sigmoid(&self, amplitude: f64) -> Self {
        self.map(|value| logistic(value) * amplitude)
    }

    #[must_use]
    pub fn relu(&self) -> Self {
        self.map(|value| value.max(0.0))
    }

    /// Row-major copy of the entries.
    #[must_use]
    pub fn flatten(&self) -> Vec<f64> {
        self.data.clone()
    }

    /// Overwrite every entry from a flat row-major buffer.
    ///
    /// The buffer length is checked before anything is written.
    pub fn reconstruct(&mut self, flat: &[f64]) -> Result<(), BrainError> {
        if flat.len() != self.data.len() {
            return Err(BrainError::ArityMismatch {
                expected: self.data.len(),
                actual: flat.len(),
            });
        }
        self.data.copy_from_slice(flat);
        Ok(())
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for row in self.data.chunks(self.cols.max(1)) {
            let cells: Vec<String> = row.iter().map(|value| format!("{value:>8.3}")).collect();
            writeln!(f, "  {}", cells.join(" "))?;
        }
        write!(f, "]")
    }
}
