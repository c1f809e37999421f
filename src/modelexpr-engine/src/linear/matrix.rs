// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::linear::boolean::MatrixBoolean;
use crate::linear::dense::MatrixDense;
use crate::linear::sparse::MatrixSparse;
use crate::linear::text;

/// How an element read treats coordinates that are fractional or fall
/// outside the matrix.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Truncate and clamp to the nearest edge element.
    #[default]
    Replicate,
    /// Truncate; anything outside the matrix reads as 0.
    Zeros,
    /// Coordinates in [0, 1] span the whole matrix, with element centers
    /// at (i + 0.5) / n.  Reads are interpolated.
    UnitMap,
    /// Bilinear interpolation, extrapolating linearly past the edges.
    Interpolate,
}

#[derive(Clone, Debug)]
pub enum Matrix {
    Dense(MatrixDense),
    Sparse(MatrixSparse),
    Boolean(MatrixBoolean),
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::Dense(MatrixDense::default())
    }
}

impl From<MatrixDense> for Matrix {
    fn from(m: MatrixDense) -> Self {
        Matrix::Dense(m)
    }
}

impl From<MatrixSparse> for Matrix {
    fn from(m: MatrixSparse) -> Self {
        Matrix::Sparse(m)
    }
}

impl From<MatrixBoolean> for Matrix {
    fn from(m: MatrixBoolean) -> Self {
        Matrix::Boolean(m)
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.to_dense() == other.to_dense()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matrix::Sparse(m) => write!(f, "{}", text::render_sparse(m)),
            _ => write!(f, "{}", text::render_dense(&self.to_dense())),
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

impl Matrix {
    /// Parse the bracketed or `Sparse` text form.
    pub fn load(source: &str) -> Result<Matrix> {
        text::load(source)
    }

    pub fn rows(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.rows(),
            Matrix::Sparse(m) => m.rows(),
            Matrix::Boolean(m) => m.rows(),
        }
    }

    pub fn columns(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.columns(),
            Matrix::Sparse(m) => m.columns(),
            Matrix::Boolean(m) => m.columns(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.columns() == 0
    }

    /// Element at (row, column).  Callers must stay within bounds.
    pub fn get(&self, row: usize, column: usize) -> f64 {
        match self {
            Matrix::Dense(m) => m.get(row, column),
            Matrix::Sparse(m) => m.get(row, column),
            Matrix::Boolean(m) => m.get(row, column) as i8 as f64,
        }
    }

    /// Dense form of this matrix.  For the dense variant this shares the
    /// underlying buffer.
    pub fn to_dense(&self) -> MatrixDense {
        match self {
            Matrix::Dense(m) => m.clone(),
            Matrix::Sparse(m) => m.to_dense(),
            Matrix::Boolean(m) => m.to_dense(),
        }
    }

    /// Read the element at a possibly fractional or out-of-range position.
    /// An empty matrix reads as 0 under every policy.
    pub fn sample(&self, row: f64, column: f64, sampling: Sampling) -> f64 {
        let rows = self.rows();
        let columns = self.columns();
        if rows == 0 || columns == 0 {
            return 0.0;
        }
        match sampling {
            Sampling::Replicate => {
                let r = clamp_index(row, rows);
                let c = clamp_index(column, columns);
                self.get(r, c)
            }
            Sampling::Zeros => {
                let r = row.floor();
                let c = column.floor();
                if r < 0.0 || c < 0.0 || r >= rows as f64 || c >= columns as f64 {
                    0.0
                } else {
                    self.get(r as usize, c as usize)
                }
            }
            Sampling::UnitMap => self.interpolate(
                row * rows as f64 - 0.5,
                column * columns as f64 - 0.5,
            ),
            Sampling::Interpolate => self.interpolate(row, column),
        }
    }

    fn interpolate(&self, row: f64, column: f64) -> f64 {
        let (r0, r1, tr) = bracket(row, self.rows());
        let (c0, c1, tc) = bracket(column, self.columns());
        let top = lerp(self.get(r0, c0), self.get(r0, c1), tc);
        let bottom = lerp(self.get(r1, c0), self.get(r1, c1), tc);
        lerp(top, bottom, tr)
    }

    pub fn transpose(&self) -> Matrix {
        Matrix::Dense(self.to_dense().transpose())
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        Matrix::Dense(self.to_dense().map(f))
    }

    /// Elementwise combination with overlap semantics: `f` applies where
    /// both matrices have an element, each operand's excess is copied
    /// through unchanged.
    pub fn zip(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Matrix {
        Matrix::Dense(self.to_dense().zip_overlap(&other.to_dense(), f))
    }

    /// Elementwise predicate producing a 0/1 matrix of our shape.
    pub fn compare(&self, other: &Matrix, f: impl Fn(f64, f64) -> bool) -> Matrix {
        Matrix::Dense(self.to_dense().compare_overlap(&other.to_dense(), f))
    }

    pub fn compare_scalar(&self, scalar: f64, f: impl Fn(f64, f64) -> bool) -> Matrix {
        self.map(|v| f(v, scalar) as i8 as f64)
    }

    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix::Dense(self.to_dense().multiply(&other.to_dense()))
    }

    pub fn inverse(&self) -> Result<Matrix> {
        Ok(Matrix::Dense(self.to_dense().inverse()?))
    }

    pub fn determinant(&self) -> Result<f64> {
        self.to_dense().determinant()
    }

    pub fn norm(&self, p: f64) -> f64 {
        self.to_dense().norm(p)
    }

    pub fn sum(&self) -> f64 {
        self.to_dense().sum()
    }

    pub fn equals(&self, other: &Matrix, epsilon: f64) -> bool {
        self.to_dense().equals(&other.to_dense(), epsilon)
    }

    /// True if any element is nonzero.
    pub fn any(&self) -> bool {
        match self {
            Matrix::Boolean(m) => m.count() > 0,
            _ => self.to_dense().fold(false, |acc, v| acc || v != 0.0),
        }
    }
}

fn clamp_index(coordinate: f64, size: usize) -> usize {
    let i = coordinate.floor();
    if i.is_nan() || i < 0.0 {
        0
    } else if i >= size as f64 {
        size - 1
    } else {
        i as usize
    }
}

/// The two indices to interpolate between and the fraction along them.
/// The lower index is clamped so positions past either edge extrapolate
/// from the outermost pair.
fn bracket(coordinate: f64, size: usize) -> (usize, usize, f64) {
    if size < 2 || coordinate.is_nan() {
        return (0, 0, 0.0);
    }
    let lower = coordinate.floor().clamp(0.0, (size - 2) as f64);
    let i = lower as usize;
    (i, i + 1, coordinate - lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn grid() -> Matrix {
        Matrix::Dense(MatrixDense::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]))
    }

    #[test]
    fn test_replicate_and_zeros() {
        let m = grid();
        assert_eq!(3.0, m.sample(1.7, 0.2, Sampling::Replicate));
        assert_eq!(4.0, m.sample(9.0, 9.0, Sampling::Replicate));
        assert_eq!(1.0, m.sample(-3.0, -0.5, Sampling::Replicate));
        assert_eq!(2.0, m.sample(0.0, 1.0, Sampling::Zeros));
        assert_eq!(0.0, m.sample(2.0, 0.0, Sampling::Zeros));
        assert_eq!(0.0, m.sample(-0.5, 0.0, Sampling::Zeros));
    }

    #[test]
    fn test_interpolate() {
        let m = grid();
        assert!(approx_eq!(f64, 2.5, m.sample(0.5, 0.5, Sampling::Interpolate)));
        assert!(approx_eq!(f64, 1.5, m.sample(0.0, 0.5, Sampling::Interpolate)));
        // linear extrapolation past the last row
        assert!(approx_eq!(f64, 5.0, m.sample(2.0, 0.0, Sampling::Interpolate)));
        assert!(approx_eq!(f64, -1.0, m.sample(-1.0, 0.0, Sampling::Interpolate)));
    }

    #[test]
    fn test_unit_map() {
        let m = grid();
        // element centers sit at 0.25 and 0.75
        assert!(approx_eq!(f64, 1.0, m.sample(0.25, 0.25, Sampling::UnitMap)));
        assert!(approx_eq!(f64, 4.0, m.sample(0.75, 0.75, Sampling::UnitMap)));
        assert!(approx_eq!(f64, 2.5, m.sample(0.5, 0.5, Sampling::UnitMap)));
    }

    #[test]
    fn test_empty_reads_zero() {
        let m = Matrix::default();
        for s in [
            Sampling::Replicate,
            Sampling::Zeros,
            Sampling::UnitMap,
            Sampling::Interpolate,
        ] {
            assert_eq!(0.0, m.sample(0.0, 0.0, s));
        }
        assert_eq!(0.0, m.norm(2.0));
        assert_eq!("[]", m.to_string());
    }

    #[test]
    fn test_single_row_interpolates_columns_only() {
        let m = Matrix::Dense(MatrixDense::from_rows(&[vec![10.0, 20.0, 40.0]]));
        assert!(approx_eq!(f64, 30.0, m.sample(5.0, 1.5, Sampling::Interpolate)));
    }

    #[test]
    fn test_variants_agree() {
        let dense = MatrixDense::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]);
        let sparse = Matrix::Sparse(MatrixSparse::from_dense(&dense));
        let boolean = Matrix::Boolean(MatrixBoolean::from_dense(&dense));
        let dense = Matrix::Dense(dense);
        assert_eq!(dense, sparse);
        assert_eq!(dense, boolean);
        assert_eq!(1.0, boolean.get(1, 0));
        let sum = sparse.zip(&boolean, |a, b| a + b);
        assert_eq!(2.0, sum.get(0, 1));
        assert!(boolean.any());
        assert!(!Matrix::Dense(MatrixDense::new(2, 2)).any());
    }
}
