// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::linear::dense::MatrixDense;

const WORD_BITS: usize = u64::BITS as usize;

/// Matrix of flags stored as one bit vector per column.  The row count is
/// the height of the tallest column ever written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatrixBoolean {
    rows: usize,
    data: Vec<Vec<u64>>,
}

impl MatrixBoolean {
    pub fn new(rows: usize, columns: usize) -> Self {
        MatrixBoolean {
            rows,
            data: vec![vec![0; rows.div_ceil(WORD_BITS)]; columns],
        }
    }

    /// Nonzero elements of `dense` become set bits.
    pub fn from_dense(dense: &MatrixDense) -> Self {
        let mut result = MatrixBoolean::new(dense.rows(), dense.columns());
        for c in 0..dense.columns() {
            for r in 0..dense.rows() {
                if dense.get(r, c) != 0.0 {
                    result.set(r, c, true);
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

    pub fn get(&self, row: usize, column: usize) -> bool {
        self.data
            .get(column)
            .and_then(|words| words.get(row / WORD_BITS))
            .is_some_and(|word| word & (1 << (row % WORD_BITS)) != 0)
    }

    pub fn set(&mut self, row: usize, column: usize, value: bool) {
        if column >= self.data.len() {
            self.data.resize(column + 1, Vec::new());
        }
        let words = &mut self.data[column];
        let word = row / WORD_BITS;
        if word >= words.len() {
            if !value {
                self.rows = self.rows.max(row + 1);
                return;
            }
            words.resize(word + 1, 0);
        }
        let bit = 1 << (row % WORD_BITS);
        if value {
            words[word] |= bit;
        } else {
            words[word] &= !bit;
        }
        self.rows = self.rows.max(row + 1);
    }

    pub fn count(&self) -> usize {
        self.data
            .iter()
            .flat_map(|words| words.iter())
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    pub fn to_dense(&self) -> MatrixDense {
        let mut data = vec![0.0; self.rows * self.data.len()];
        for c in 0..self.data.len() {
            for r in 0..self.rows {
                if self.get(r, c) {
                    data[c * self.rows + r] = 1.0;
                }
            }
        }
        MatrixDense::from_column_major_unchecked(self.rows, self.data.len(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits() {
        let mut m = MatrixBoolean::default();
        m.set(3, 1, true);
        m.set(70, 0, true);
        assert_eq!(71, m.rows());
        assert_eq!(2, m.columns());
        assert!(m.get(3, 1));
        assert!(m.get(70, 0));
        assert!(!m.get(3, 0));
        assert!(!m.get(500, 5));
        assert_eq!(2, m.count());
        m.set(70, 0, false);
        assert!(!m.get(70, 0));
        assert_eq!(1, m.count());
        // rows never shrink
        assert_eq!(71, m.rows());
    }

    #[test]
    fn test_dense_conversion() {
        let dense = MatrixDense::from_rows(&[vec![0.0, 2.0], vec![-1.0, 0.0]]);
        let m = MatrixBoolean::from_dense(&dense);
        assert_eq!(
            vec![0.0, 1.0, 1.0, 0.0],
            m.to_dense().to_column_major()
        );
    }
}
