// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Householder QR factorization with column pivoting.
//!
//! At each step the remaining column with the greatest norm is swapped into
//! place before its reflection is computed, so the magnitudes along the
//! diagonal of R are non-increasing.  That ordering makes the R diagonal a
//! usable rank estimate.  The factorization satisfies `Q * R = A * P`, where
//! `P` is the column permutation reported by [`FactorQr::permutation`].

use crate::common::Result;
use crate::linear::dense::MatrixDense;
use crate::linear_err;

#[derive(Clone, Debug)]
pub struct FactorQr {
    // column-major m x n; Householder vectors on and below the diagonal,
    // the strict upper triangle of R above it
    qr: Vec<f64>,
    m: usize,
    n: usize,
    rdiag: Vec<f64>,
    pivot: Vec<usize>,
}

impl FactorQr {
    pub fn new(a: &MatrixDense) -> Self {
        let m = a.rows();
        let n = a.columns();
        let k = m.min(n);
        let mut qr = a.to_column_major();
        let mut rdiag = vec![0.0; k];
        let mut pivot: Vec<usize> = (0..n).collect();

        for step in 0..k {
            // pick the remaining column with the largest norm below this row
            let mut best = step;
            let mut best_norm = -1.0;
            for j in step..n {
                let column = &qr[j * m + step..j * m + m];
                let norm: f64 = column.iter().map(|v| v * v).sum();
                if norm > best_norm {
                    best_norm = norm;
                    best = j;
                }
            }
            if best != step {
                for i in 0..m {
                    qr.swap(step * m + i, best * m + i);
                }
                pivot.swap(step, best);
            }

            let mut nrm = 0.0_f64;
            for i in step..m {
                nrm = nrm.hypot(qr[step * m + i]);
            }

            if nrm != 0.0 {
                if qr[step * m + step] < 0.0 {
                    nrm = -nrm;
                }
                for i in step..m {
                    qr[step * m + i] /= nrm;
                }
                qr[step * m + step] += 1.0;

                let head = qr[step * m + step];
                for j in step + 1..n {
                    let mut s = 0.0;
                    for i in step..m {
                        s += qr[step * m + i] * qr[j * m + i];
                    }
                    s = -s / head;
                    for i in step..m {
                        qr[j * m + i] += s * qr[step * m + i];
                    }
                }
            }
            rdiag[step] = -nrm;
        }

        FactorQr {
            qr,
            m,
            n,
            rdiag,
            pivot,
        }
    }

    fn rank_count(&self) -> usize {
        self.m.min(self.n)
    }

    /// Tolerance used when no threshold is supplied: the diagonal entries
    /// of R at the level of rounding noise relative to the largest one.
    pub fn default_threshold(&self) -> f64 {
        let largest = self.rdiag.first().map(|v| v.abs()).unwrap_or(0.0);
        self.m.max(self.n) as f64 * f64::EPSILON * largest
    }

    /// Number of diagonal entries of R whose magnitude exceeds `threshold`.
    pub fn rank(&self, threshold: f64) -> usize {
        self.rdiag.iter().filter(|d| d.abs() > threshold).count()
    }

    pub fn is_full_rank(&self) -> bool {
        self.rank(self.default_threshold()) == self.rank_count()
    }

    /// Column permutation: column `j` of `A * P` is column `permutation()[j]` of `A`.
    pub fn permutation(&self) -> &[usize] {
        &self.pivot
    }

    pub fn r_diagonal(&self) -> &[f64] {
        &self.rdiag
    }

    /// The m x k orthonormal factor, k = min(m, n).
    pub fn q(&self) -> MatrixDense {
        let m = self.m;
        let k = self.rank_count();
        let mut q = vec![0.0; m * k];
        for kk in (0..k).rev() {
            q[kk * m + kk] = 1.0;
            let head = self.qr[kk * m + kk];
            if head == 0.0 {
                continue;
            }
            for j in kk..k {
                let mut s = 0.0;
                for i in kk..m {
                    s += self.qr[kk * m + i] * q[j * m + i];
                }
                s = -s / head;
                for i in kk..m {
                    q[j * m + i] += s * self.qr[kk * m + i];
                }
            }
        }
        MatrixDense::from_column_major_unchecked(m, k, q)
    }

    /// The k x n upper triangular factor.
    pub fn r(&self) -> MatrixDense {
        let m = self.m;
        let k = self.rank_count();
        let mut r = vec![0.0; k * self.n];
        for j in 0..self.n {
            for i in 0..k.min(j + 1) {
                r[j * k + i] = if i == j {
                    self.rdiag[i]
                } else {
                    self.qr[j * m + i]
                };
            }
        }
        MatrixDense::from_column_major_unchecked(k, self.n, r)
    }

    /// Least-squares solution of `A * X = B`.  With `permute` set, the rows
    /// of X are left in pivoted order, solving `(A * P) * X = B` instead.
    /// When A has more columns than rows, the trailing unknowns are zero.
    pub fn solve(&self, b: &MatrixDense, permute: bool) -> Result<MatrixDense> {
        let m = self.m;
        let n = self.n;
        let k = self.rank_count();
        if b.rows() != m {
            return linear_err!(
                DimensionMismatch,
                format!("right-hand side has {} rows, expected {}", b.rows(), m)
            );
        }
        let rank = self.rank(self.default_threshold());
        if rank < k {
            return linear_err!(
                RankDeficient,
                format!("rank {rank} of {m}x{n} matrix")
            );
        }

        let nx = b.columns();
        let mut x = b.to_column_major();

        // apply Q transpose
        for step in 0..k {
            let head = self.qr[step * m + step];
            if head == 0.0 {
                continue;
            }
            for j in 0..nx {
                let mut s = 0.0;
                for i in step..m {
                    s += self.qr[step * m + i] * x[j * m + i];
                }
                s = -s / head;
                for i in step..m {
                    x[j * m + i] += s * self.qr[step * m + i];
                }
            }
        }

        // back substitution against the leading k x k block of R
        for j in 0..nx {
            for kk in (0..k).rev() {
                x[j * m + kk] /= self.rdiag[kk];
                let y = x[j * m + kk];
                for i in 0..kk {
                    x[j * m + i] -= y * self.qr[kk * m + i];
                }
            }
        }

        let mut result = vec![0.0; n * nx];
        for j in 0..nx {
            for i in 0..k {
                let row = if permute { i } else { self.pivot[i] };
                result[j * n + row] = x[j * m + i];
            }
        }
        Ok(MatrixDense::from_column_major_unchecked(n, nx, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    fn permuted(a: &MatrixDense, pivot: &[usize]) -> MatrixDense {
        let mut result = MatrixDense::new(a.rows(), a.columns());
        for (j, &p) in pivot.iter().enumerate() {
            for i in 0..a.rows() {
                result.set(i, j, a.get(i, p));
            }
        }
        result
    }

    #[test]
    fn test_q_times_r_is_permuted_a() {
        let a = MatrixDense::from_rows(&[
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 10.0],
            vec![1.0, 0.0, 1.0],
        ]);
        let qr = FactorQr::new(&a);
        let q = qr.q();
        let r = qr.r();
        assert_eq!((4, 3), (q.rows(), q.columns()));
        assert_eq!((3, 3), (r.rows(), r.columns()));
        let ap = permuted(&a, qr.permutation());
        assert!(q.multiply(&r).equals(&ap, 1e-10));
        // Q has orthonormal columns
        assert!(q.transpose().multiply(&q).equals(&MatrixDense::identity(3), 1e-10));
        // pivoting orders the diagonal by magnitude
        let d = qr.r_diagonal();
        assert!(d[0].abs() >= d[1].abs() && d[1].abs() >= d[2].abs());
    }

    #[test]
    fn test_wide_matrix() {
        let a = MatrixDense::from_rows(&[vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 4.0]]);
        let qr = FactorQr::new(&a);
        let ap = permuted(&a, qr.permutation());
        assert!(qr.q().multiply(&qr.r()).equals(&ap, 1e-10));
        assert_eq!(2, qr.rank(qr.default_threshold()));

        // basic solution: the unknowns past the rank are zero
        let b = MatrixDense::column_vector(&[6.0, 5.0]);
        let x = qr.solve(&b, false).unwrap();
        assert_eq!(3, x.rows());
        assert!(a.multiply(&x).equals(&b, 1e-10));
    }

    #[test]
    fn test_rank() {
        // a zero column stays exactly zero through every reflection
        let a = MatrixDense::from_rows(&[
            vec![1.0, 0.0, 2.0],
            vec![3.0, 0.0, 4.0],
            vec![5.0, 0.0, 6.0],
        ]);
        let qr = FactorQr::new(&a);
        assert_eq!(2, qr.rank(1e-9));
        assert_eq!(1, qr.permutation()[2]);
        assert!(!qr.is_full_rank());
        let err = qr.solve(&MatrixDense::column_vector(&[1.0, 2.0, 3.0]), false);
        assert_eq!(ErrorCode::RankDeficient, err.unwrap_err().code);

        let zero = FactorQr::new(&MatrixDense::new(3, 3));
        assert_eq!(0, zero.rank(0.0));
    }

    #[test]
    fn test_solve_square_and_permuted() {
        let a = MatrixDense::from_rows(&[
            vec![2.0, 1.0, 0.0],
            vec![1.0, 3.0, 1.0],
            vec![0.0, 1.0, 9.0],
        ]);
        let b = MatrixDense::from_rows(&[vec![1.0, 0.0], vec![2.0, 1.0], vec![3.0, 0.0]]);
        let qr = FactorQr::new(&a);
        let x = qr.solve(&b, false).unwrap();
        assert!(a.multiply(&x).equals(&b, 1e-10));

        let z = qr.solve(&b, true).unwrap();
        let ap = permuted(&a, qr.permutation());
        assert!(ap.multiply(&z).equals(&b, 1e-10));
    }

    #[test]
    fn test_least_squares() {
        // fit y = c0 + c1 * t through points that lie on y = 1 + 2t
        let a = MatrixDense::from_rows(&[
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![1.0, 2.0],
            vec![1.0, 3.0],
        ]);
        let b = MatrixDense::column_vector(&[1.0, 3.0, 5.0, 7.0]);
        let x = FactorQr::new(&a).solve(&b, false).unwrap();
        assert!(x.equals(&MatrixDense::column_vector(&[1.0, 2.0]), 1e-10));
    }

    #[test]
    fn test_solve_checks_rows() {
        let qr = FactorQr::new(&MatrixDense::identity(2));
        let err = qr.solve(&MatrixDense::column_vector(&[1.0, 2.0, 3.0]), false);
        assert_eq!(ErrorCode::DimensionMismatch, err.unwrap_err().code);
    }
}
