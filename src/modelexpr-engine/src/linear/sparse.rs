// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

use crate::linear::dense::MatrixDense;

/// Sparse matrix stored as one ordered map per column.  Elements that were
/// never set read as `empty`, which need not be zero.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixSparse {
    rows: usize,
    data: Vec<BTreeMap<usize, f64>>,
    empty: f64,
}

impl Default for MatrixSparse {
    fn default() -> Self {
        MatrixSparse::new(0, 0)
    }
}

impl MatrixSparse {
    pub fn new(rows: usize, columns: usize) -> Self {
        MatrixSparse::with_empty(rows, columns, 0.0)
    }

    pub fn with_empty(rows: usize, columns: usize, empty: f64) -> Self {
        MatrixSparse {
            rows,
            data: vec![BTreeMap::new(); columns],
            empty,
        }
    }

    pub fn from_dense(dense: &MatrixDense) -> Self {
        let mut result = MatrixSparse::new(dense.rows(), dense.columns());
        for c in 0..dense.columns() {
            for r in 0..dense.rows() {
                let v = dense.get(r, c);
                if v != 0.0 {
                    result.data[c].insert(r, v);
                }
            }
        }
        result
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.data.len()
    }

    pub fn empty_value(&self) -> f64 {
        self.empty
    }

    /// Number of explicitly stored elements.
    pub fn stored(&self) -> usize {
        self.data.iter().map(|c| c.len()).sum()
    }

    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.data
            .get(column)
            .and_then(|c| c.get(&row))
            .copied()
            .unwrap_or(self.empty)
    }

    /// Store an element, growing the matrix if the position lies outside
    /// it.  Storing the empty value removes the element.
    pub fn set(&mut self, row: usize, column: usize, value: f64) {
        if column >= self.data.len() {
            self.data.resize(column + 1, BTreeMap::new());
        }
        self.rows = self.rows.max(row + 1);
        if value == self.empty {
            self.data[column].remove(&row);
        } else {
            self.data[column].insert(row, value);
        }
    }

    /// Stored elements as (row, column, value), in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.data
            .iter()
            .enumerate()
            .flat_map(|(c, column)| column.iter().map(move |(&r, &v)| (r, c, v)))
    }

    pub fn to_dense(&self) -> MatrixDense {
        let mut data = vec![self.empty; self.rows * self.data.len()];
        for (r, c, v) in self.iter() {
            data[c * self.rows + r] = v;
        }
        MatrixDense::from_column_major_unchecked(self.rows, self.data.len(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_get_set() {
        let mut m = MatrixSparse::new(2, 2);
        m.set(0, 1, 3.0);
        m.set(4, 0, -1.0);
        assert_eq!(5, m.rows());
        assert_eq!(2, m.columns());
        assert_eq!(3.0, m.get(0, 1));
        assert_eq!(0.0, m.get(1, 1));
        assert_eq!(0.0, m.get(100, 100));
        assert_eq!(2, m.stored());
        m.set(0, 1, 0.0);
        assert_eq!(1, m.stored());
        assert_eq!(vec![(4, 0, -1.0)], m.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_nonzero_empty_value() {
        let mut m = MatrixSparse::with_empty(2, 2, 7.0);
        m.set(1, 1, 0.0);
        assert_eq!(7.0, m.get(0, 0));
        assert_eq!(0.0, m.get(1, 1));
        let dense = m.to_dense();
        assert_eq!(vec![7.0, 7.0, 7.0, 0.0], dense.to_column_major());
        m.set(1, 1, 7.0);
        assert_eq!(0, m.stored());
    }

    #[test]
    fn test_from_dense_skips_zeros() {
        let dense = MatrixDense::from_rows(&[vec![0.0, 2.0], vec![3.0, 0.0]]);
        let m = MatrixSparse::from_dense(&dense);
        assert_eq!(2, m.stored());
        assert_eq!(dense, m.to_dense());
    }
}
