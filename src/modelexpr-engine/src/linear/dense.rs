// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Dense matrix storage.
//!
//! Elements live in a single shared buffer addressed through an offset and a
//! pair of strides.  Transposes, sub-regions, rows and columns are all views
//! that adjust `offset`/`stride_r`/`stride_c` instead of copying.  Writing
//! through `set` copies the buffer first if any other view still shares it,
//! so a value handed out by an operator is never changed underneath its
//! holder.

use std::rc::Rc;

use crate::common::Result;
use crate::linear::qr::FactorQr;
use crate::linear_err;

#[derive(Clone, Debug)]
pub struct MatrixDense {
    data: Rc<Vec<f64>>,
    offset: usize,
    rows: usize,
    columns: usize,
    stride_r: usize,
    stride_c: usize,
}

impl Default for MatrixDense {
    fn default() -> Self {
        MatrixDense::new(0, 0)
    }
}

impl PartialEq for MatrixDense {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, 0.0)
    }
}

impl MatrixDense {
    /// Create a zero-filled matrix in column-major order.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self::filled(rows, columns, 0.0)
    }

    pub fn filled(rows: usize, columns: usize, value: f64) -> Self {
        Self::from_column_major_unchecked(rows, columns, vec![value; rows * columns])
    }

    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self::from_column_major_unchecked(n, n, data)
    }

    pub fn from_column_major(rows: usize, columns: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * columns {
            return linear_err!(
                DimensionMismatch,
                format!(
                    "{} elements do not fill a {}x{} matrix",
                    data.len(),
                    rows,
                    columns
                )
            );
        }
        Ok(Self::from_column_major_unchecked(rows, columns, data))
    }

    pub(crate) fn from_column_major_unchecked(rows: usize, columns: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), rows * columns);
        MatrixDense {
            data: Rc::new(data),
            offset: 0,
            rows,
            columns,
            stride_r: 1,
            stride_c: rows,
        }
    }

    /// Build a matrix from a list of rows.  Short rows are padded with zeros.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let n_rows = rows.len();
        let n_columns = rows.iter().map(|r| r.as_ref().len()).max().unwrap_or(0);
        let mut data = vec![0.0; n_rows * n_columns];
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.as_ref().iter().enumerate() {
                data[c * n_rows + r] = *value;
            }
        }
        Self::from_column_major_unchecked(n_rows, n_columns, data)
    }

    /// A single column vector.
    pub fn column_vector(values: &[f64]) -> Self {
        Self::from_column_major_unchecked(values.len(), 1, values.to_vec())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns == 0
    }

    #[inline]
    fn index(&self, row: usize, column: usize) -> usize {
        debug_assert!(row < self.rows && column < self.columns);
        self.offset + row * self.stride_r + column * self.stride_c
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.data[self.index(row, column)]
    }

    /// Read an element, returning None outside the matrix bounds.
    pub fn get_checked(&self, row: usize, column: usize) -> Option<f64> {
        if row < self.rows && column < self.columns {
            Some(self.get(row, column))
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        let i = self.index(row, column);
        Rc::make_mut(&mut self.data)[i] = value;
    }

    /// True if this view shares its buffer with another live view.
    pub fn is_shared(&self) -> bool {
        Rc::strong_count(&self.data) > 1
    }

    /// Zero-copy transpose.
    pub fn transpose(&self) -> MatrixDense {
        MatrixDense {
            data: self.data.clone(),
            offset: self.offset,
            rows: self.columns,
            columns: self.rows,
            stride_r: self.stride_c,
            stride_c: self.stride_r,
        }
    }

    /// Zero-copy view of the block starting at (row, column).  The block is
    /// clipped to the bounds of this matrix.
    pub fn region(&self, row: usize, column: usize, rows: usize, columns: usize) -> MatrixDense {
        let row = row.min(self.rows);
        let column = column.min(self.columns);
        let rows = rows.min(self.rows - row);
        let columns = columns.min(self.columns - column);
        MatrixDense {
            data: self.data.clone(),
            offset: self.offset + row * self.stride_r + column * self.stride_c,
            rows,
            columns,
            stride_r: self.stride_r,
            stride_c: self.stride_c,
        }
    }

    pub fn row(&self, row: usize) -> MatrixDense {
        self.region(row, 0, 1, self.columns)
    }

    pub fn column(&self, column: usize) -> MatrixDense {
        self.region(0, column, self.rows, 1)
    }

    /// Copy the viewed elements into a fresh column-major vector.
    pub fn to_column_major(&self) -> Vec<f64> {
        let mut result = Vec::with_capacity(self.rows * self.columns);
        let data = &self.data[..];
        let mut column_start = self.offset;
        for _ in 0..self.columns {
            let mut i = column_start;
            for _ in 0..self.rows {
                result.push(data[i]);
                i += self.stride_r;
            }
            column_start += self.stride_c;
        }
        result
    }

    /// A copy of this view that owns a compact column-major buffer.
    pub fn compact(&self) -> MatrixDense {
        Self::from_column_major_unchecked(self.rows, self.columns, self.to_column_major())
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> MatrixDense {
        let mut result = self.to_column_major();
        for v in result.iter_mut() {
            *v = f(*v);
        }
        Self::from_column_major_unchecked(self.rows, self.columns, result)
    }

    /// Combine two matrices elementwise over the union of their extents.
    /// Where both have an element, `f` combines them.  Where only one does,
    /// its element passes through unchanged.  Where neither does (the corner
    /// left when one operand is taller and the other wider) the result is 0.
    pub fn zip_overlap(&self, other: &MatrixDense, f: impl Fn(f64, f64) -> f64) -> MatrixDense {
        let rows = self.rows.max(other.rows);
        let columns = self.columns.max(other.columns);
        let mut result = vec![0.0; rows * columns];
        let a = &self.data[..];
        let b = &other.data[..];

        let mut a_column = self.offset;
        let mut b_column = other.offset;
        let mut out = 0;
        for c in 0..columns {
            let a_has_column = c < self.columns;
            let b_has_column = c < other.columns;
            let mut ia = a_column;
            let mut ib = b_column;
            for r in 0..rows {
                let in_a = a_has_column && r < self.rows;
                let in_b = b_has_column && r < other.rows;
                result[out] = match (in_a, in_b) {
                    (true, true) => f(a[ia], b[ib]),
                    (true, false) => a[ia],
                    (false, true) => b[ib],
                    (false, false) => 0.0,
                };
                out += 1;
                ia += self.stride_r;
                ib += other.stride_r;
            }
            a_column += self.stride_c;
            b_column += other.stride_c;
        }
        Self::from_column_major_unchecked(rows, columns, result)
    }

    /// Elementwise predicate over the overlap, producing a 0/1 matrix with
    /// the shape of `self`.  Elements of `self` outside the overlap are 0.
    pub fn compare_overlap(&self, other: &MatrixDense, f: impl Fn(f64, f64) -> bool) -> MatrixDense {
        let rows = self.rows.min(other.rows);
        let columns = self.columns.min(other.columns);
        let mut result = vec![0.0; self.rows * self.columns];
        let a = &self.data[..];
        let b = &other.data[..];
        let mut a_column = self.offset;
        let mut b_column = other.offset;
        for c in 0..columns {
            let mut ia = a_column;
            let mut ib = b_column;
            let out = c * self.rows;
            for r in 0..rows {
                result[out + r] = f(a[ia], b[ib]) as i8 as f64;
                ia += self.stride_r;
                ib += other.stride_r;
            }
            a_column += self.stride_c;
            b_column += other.stride_c;
        }
        Self::from_column_major_unchecked(self.rows, self.columns, result)
    }

    /// Matrix product.  The inner dimension is the smaller of our column
    /// count and the other matrix's row count.
    pub fn multiply(&self, other: &MatrixDense) -> MatrixDense {
        let rows = self.rows;
        let columns = other.columns;
        let inner = self.columns.min(other.rows);
        let mut result = vec![0.0; rows * columns];
        let a = &self.data[..];
        let b = &other.data[..];
        for c in 0..columns {
            let out = c * rows;
            let mut ib = other.offset + c * other.stride_c;
            let mut a_column = self.offset;
            for _ in 0..inner {
                let scale = b[ib];
                if scale != 0.0 {
                    let mut ia = a_column;
                    for r in 0..rows {
                        result[out + r] += a[ia] * scale;
                        ia += self.stride_r;
                    }
                }
                ib += other.stride_r;
                a_column += self.stride_c;
            }
        }
        Self::from_column_major_unchecked(rows, columns, result)
    }

    pub fn sum(&self) -> f64 {
        self.fold(0.0, |acc, v| acc + v)
    }

    pub fn sum_squares(&self) -> f64 {
        self.fold(0.0, |acc, v| acc + v * v)
    }

    /// The p-norm of all elements taken as one vector.  `p == 0` counts
    /// nonzero elements and `p == inf` is the largest magnitude.  An empty
    /// matrix has norm 0 for every p.
    pub fn norm(&self, p: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        if p == 0.0 {
            self.fold(0.0, |acc, v| if v != 0.0 { acc + 1.0 } else { acc })
        } else if p == 1.0 {
            self.fold(0.0, |acc, v| acc + v.abs())
        } else if p == 2.0 {
            self.sum_squares().sqrt()
        } else if p.is_infinite() {
            self.fold(0.0, |acc: f64, v| acc.max(v.abs()))
        } else {
            self.fold(0.0, |acc, v| acc + v.abs().powf(p)).powf(1.0 / p)
        }
    }

    /// Smallest element, or None when the matrix is empty.
    pub fn min_element(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.fold(f64::INFINITY, f64::min))
    }

    /// Largest element, or None when the matrix is empty.
    pub fn max_element(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.fold(f64::NEG_INFINITY, f64::max))
    }

    pub fn fold<T>(&self, init: T, f: impl Fn(T, f64) -> T) -> T {
        let data = &self.data[..];
        let mut acc = init;
        let mut column_start = self.offset;
        for _ in 0..self.columns {
            let mut i = column_start;
            for _ in 0..self.rows {
                acc = f(acc, data[i]);
                i += self.stride_r;
            }
            column_start += self.stride_c;
        }
        acc
    }

    /// Determinant by Gaussian elimination with partial pivoting.
    pub fn determinant(&self) -> Result<f64> {
        if self.rows != self.columns {
            return linear_err!(
                NotSquare,
                format!("determinant of {}x{} matrix", self.rows, self.columns)
            );
        }
        let n = self.rows;
        let mut a = self.to_column_major();
        let mut det = 1.0;
        for k in 0..n {
            let mut pivot = k;
            let mut largest = a[k * n + k].abs();
            for r in k + 1..n {
                let v = a[k * n + r].abs();
                if v > largest {
                    largest = v;
                    pivot = r;
                }
            }
            if largest == 0.0 {
                return Ok(0.0);
            }
            if pivot != k {
                for c in 0..n {
                    a.swap(c * n + k, c * n + pivot);
                }
                det = -det;
            }
            let d = a[k * n + k];
            det *= d;
            for r in k + 1..n {
                let factor = a[k * n + r] / d;
                if factor == 0.0 {
                    continue;
                }
                for c in k + 1..n {
                    a[c * n + r] -= factor * a[c * n + k];
                }
            }
        }
        Ok(det)
    }

    /// Inverse of a square matrix, computed from its pivoted QR factorization.
    pub fn inverse(&self) -> Result<MatrixDense> {
        if self.rows != self.columns {
            return linear_err!(
                NotSquare,
                format!("inverse of {}x{} matrix", self.rows, self.columns)
            );
        }
        if self.is_empty() {
            return Ok(MatrixDense::new(0, 0));
        }
        let qr = FactorQr::new(self);
        if !qr.is_full_rank() {
            return linear_err!(Singular, "matrix is not invertible".to_owned());
        }
        qr.solve(&MatrixDense::identity(self.rows), false)
    }

    /// Element-by-element comparison within an absolute tolerance.
    pub fn equals(&self, other: &MatrixDense, epsilon: f64) -> bool {
        if self.rows != other.rows || self.columns != other.columns {
            return false;
        }
        for c in 0..self.columns {
            for r in 0..self.rows {
                let a = self.get(r, c);
                let b = other.get(r, c);
                if a != b && (a - b).abs() > epsilon {
                    return false;
                }
            }
        }
        true
    }
}
