// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Bunch-Kaufman factorization of a symmetric indefinite matrix.
//!
//! `A = U * D * U^T`, where U is a product of permutations and unit upper
//! triangular block transforms and D is block diagonal with 1x1 and 2x2
//! blocks.  Only the upper triangle of A is read.  The factorization works
//! from the last column toward the first.

use crate::common::Result;
use crate::linear::dense::MatrixDense;
use crate::linear_err;

/// Pivot threshold balancing element growth against the use of 2x2 blocks.
fn alpha() -> f64 {
    (1.0 + 17f64.sqrt()) / 8.0
}

const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// How the diagonal block at a given column was formed.  The payload is
/// the row and column interchanged with it.  Both columns of a 2x2 block
/// carry the same `Double` entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pivot {
    Single(usize),
    Double(usize),
}

#[derive(Clone, Debug)]
pub struct FactorBunchKaufman {
    // column-major n x n; the upper triangle holds U and D
    a: Vec<f64>,
    n: usize,
    pivots: Vec<Pivot>,
}

impl FactorBunchKaufman {
    pub fn new(matrix: &MatrixDense) -> Result<Self> {
        let n = matrix.rows();
        if matrix.columns() != n {
            return linear_err!(
                NotSquare,
                format!("{}x{} matrix is not square", n, matrix.columns())
            );
        }
        let scale = matrix.norm(f64::INFINITY).max(1.0);
        for j in 0..n {
            for i in 0..j {
                if (matrix.get(i, j) - matrix.get(j, i)).abs() > SYMMETRY_TOLERANCE * scale {
                    return linear_err!(
                        NotSymmetric,
                        format!("element ({i}, {j}) differs from ({j}, {i})")
                    );
                }
            }
        }

        let mut a = matrix.to_column_major();
        let mut pivots = vec![Pivot::Single(0); n];
        let alpha = alpha();
        let at = |r: usize, c: usize| c * n + r;

        let mut k = n;
        while k > 0 {
            let col = k - 1;
            let mut kstep = 1;
            let absakk = a[at(col, col)].abs();

            let mut imax = 0;
            let mut colmax = 0.0;
            for i in 0..col {
                let v = a[at(i, col)].abs();
                if v > colmax {
                    colmax = v;
                    imax = i;
                }
            }

            if absakk.max(colmax) == 0.0 {
                return linear_err!(Singular, format!("zero pivot at column {col}"));
            }

            let kp = if absakk >= alpha * colmax {
                col
            } else {
                let mut rowmax = 0.0_f64;
                for j in imax + 1..=col {
                    rowmax = rowmax.max(a[at(imax, j)].abs());
                }
                for j in 0..imax {
                    rowmax = rowmax.max(a[at(j, imax)].abs());
                }
                if absakk >= alpha * colmax * (colmax / rowmax) {
                    col
                } else if a[at(imax, imax)].abs() >= alpha * rowmax {
                    imax
                } else {
                    kstep = 2;
                    imax
                }
            };

            let kk = col + 1 - kstep;
            if kp != kk {
                // symmetric interchange of rows and columns kk and kp
                for i in 0..kp {
                    a.swap(at(i, kk), at(i, kp));
                }
                for j in kp + 1..kk {
                    a.swap(at(j, kk), at(kp, j));
                }
                a.swap(at(kk, kk), at(kp, kp));
                if kstep == 2 {
                    a.swap(at(col - 1, col), at(kp, col));
                }
            }

            if kstep == 1 {
                // rank-1 update of the leading submatrix
                let r1 = 1.0 / a[at(col, col)];
                for j in 0..col {
                    let ajk = a[at(j, col)];
                    for i in 0..=j {
                        a[at(i, j)] -= r1 * a[at(i, col)] * ajk;
                    }
                }
                for i in 0..col {
                    a[at(i, col)] *= r1;
                }
                pivots[col] = Pivot::Single(kp);
            } else {
                // rank-2 update of the leading submatrix
                if col > 1 {
                    let d12 = a[at(col - 1, col)];
                    let d22 = a[at(col - 1, col - 1)] / d12;
                    let d11 = a[at(col, col)] / d12;
                    let t = 1.0 / (d11 * d22 - 1.0);
                    let d12 = t / d12;
                    for j in (0..col - 1).rev() {
                        let wkm1 = d12 * (d11 * a[at(j, col - 1)] - a[at(j, col)]);
                        let wk = d12 * (d22 * a[at(j, col)] - a[at(j, col - 1)]);
                        for i in (0..=j).rev() {
                            a[at(i, j)] -= a[at(i, col)] * wk + a[at(i, col - 1)] * wkm1;
                        }
                        a[at(j, col)] = wk;
                        a[at(j, col - 1)] = wkm1;
                    }
                }
                pivots[col] = Pivot::Double(kp);
                pivots[col - 1] = Pivot::Double(kp);
            }

            k -= kstep;
        }

        Ok(FactorBunchKaufman { a, n, pivots })
    }

    pub fn pivots(&self) -> &[Pivot] {
        &self.pivots
    }

    #[inline]
    fn get(&self, r: usize, c: usize) -> f64 {
        self.a[c * self.n + r]
    }

    /// Solve `A * X = B`.
    pub fn solve(&self, b: &MatrixDense) -> Result<MatrixDense> {
        let n = self.n;
        if b.rows() != n {
            return linear_err!(
                DimensionMismatch,
                format!("right-hand side has {} rows, expected {}", b.rows(), n)
            );
        }
        let nrhs = b.columns();
        let mut x = b.to_column_major();
        let swap_rows = |x: &mut [f64], r1: usize, r2: usize| {
            for j in 0..nrhs {
                x.swap(j * n + r1, j * n + r2);
            }
        };

        // backward sweep: solve U * D * Y = B
        let mut k = n;
        while k > 0 {
            let col = k - 1;
            match self.pivots[col] {
                Pivot::Single(kp) => {
                    if kp != col {
                        swap_rows(&mut x, col, kp);
                    }
                    for j in 0..nrhs {
                        let bk = x[j * n + col];
                        for i in 0..col {
                            x[j * n + i] -= self.get(i, col) * bk;
                        }
                        x[j * n + col] = bk / self.get(col, col);
                    }
                    k -= 1;
                }
                Pivot::Double(kp) => {
                    if kp != col - 1 {
                        swap_rows(&mut x, col - 1, kp);
                    }
                    let akm1k = self.get(col - 1, col);
                    let akm1 = self.get(col - 1, col - 1) / akm1k;
                    let ak = self.get(col, col) / akm1k;
                    let denom = akm1 * ak - 1.0;
                    for j in 0..nrhs {
                        let bk = x[j * n + col];
                        let bkm1 = x[j * n + col - 1];
                        for i in 0..col - 1 {
                            x[j * n + i] -= self.get(i, col) * bk + self.get(i, col - 1) * bkm1;
                        }
                        let bkm1 = bkm1 / akm1k;
                        let bk = bk / akm1k;
                        x[j * n + col - 1] = (ak * bkm1 - bk) / denom;
                        x[j * n + col] = (akm1 * bk - bkm1) / denom;
                    }
                    k -= 2;
                }
            }
        }

        // forward sweep: solve U^T * X = Y
        let mut k = 0;
        while k < n {
            match self.pivots[k] {
                Pivot::Single(kp) => {
                    for j in 0..nrhs {
                        let mut s = 0.0;
                        for i in 0..k {
                            s += self.get(i, k) * x[j * n + i];
                        }
                        x[j * n + k] -= s;
                    }
                    if kp != k {
                        swap_rows(&mut x, k, kp);
                    }
                    k += 1;
                }
                Pivot::Double(kp) => {
                    for j in 0..nrhs {
                        let mut s0 = 0.0;
                        let mut s1 = 0.0;
                        for i in 0..k {
                            s0 += self.get(i, k) * x[j * n + i];
                            s1 += self.get(i, k + 1) * x[j * n + i];
                        }
                        x[j * n + k] -= s0;
                        x[j * n + k + 1] -= s1;
                    }
                    if kp != k {
                        swap_rows(&mut x, k, kp);
                    }
                    k += 2;
                }
            }
        }

        Ok(MatrixDense::from_column_major_unchecked(n, nrhs, x))
    }
}
