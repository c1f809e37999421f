// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use float_cmp::approx_eq;
use proptest::prelude::*;

use modelexpr_engine::linear::Pivot;
use modelexpr_engine::{ErrorCode, FactorBunchKaufman, FactorQr, Matrix, MatrixDense, MatrixSparse};

fn permuted(a: &MatrixDense, pivot: &[usize]) -> MatrixDense {
    let mut result = MatrixDense::new(a.rows(), a.columns());
    for (j, &p) in pivot.iter().enumerate() {
        for i in 0..a.rows() {
            result.set(i, j, a.get(i, p));
        }
    }
    result
}

fn dense(rows: usize, columns: usize, values: &[f64]) -> MatrixDense {
    let mut m = MatrixDense::new(rows, columns);
    for r in 0..rows {
        for c in 0..columns {
            m.set(r, c, values[r * columns + c]);
        }
    }
    m
}

fn symmetric(n: usize, values: &[f64]) -> MatrixDense {
    let mut m = MatrixDense::new(n, n);
    for c in 0..n {
        for r in 0..c {
            let v = values[r * n + c];
            m.set(r, c, v);
            m.set(c, r, v);
        }
        let sign = if c % 2 == 0 { 1.0 } else { -1.0 };
        m.set(c, c, sign * (n as f64 + 1.0) + values[c * n + c] * 0.5);
    }
    m
}

#[test]
fn loaded_text_is_row_major() {
    let m = Matrix::load("[1,2;3,4]").unwrap();
    assert_eq!((2, 2), (m.rows(), m.columns()));
    assert_eq!(3.0, m.get(1, 0));
    assert!(approx_eq!(f64, -2.0, m.determinant().unwrap(), epsilon = 1e-12));
    assert_eq!("[1,2;3,4]", m.to_string());
}

#[test]
fn empty_matrix() {
    let m = Matrix::load("[]").unwrap();
    assert!(m.is_empty());
    assert_eq!("[]", m.to_string());
    assert_eq!(0.0, m.norm(2.0));
    assert_eq!(0.0, m.sum());
}

#[test]
fn singular_inverse_fails() {
    let m = Matrix::load("[1,2;2,4]").unwrap();
    assert_eq!(ErrorCode::Singular, m.inverse().unwrap_err().code);

    let m = Matrix::load("[2,0;0,4]").unwrap();
    let inverse = m.inverse().unwrap().to_dense();
    assert!(inverse.equals(&dense(2, 2, &[0.5, 0.0, 0.0, 0.25]), 1e-12));
}

#[test]
fn indefinite_matrix_uses_a_block_pivot() {
    let a = dense(2, 2, &[0.0, 1.0, 1.0, 0.0]);
    let factor = FactorBunchKaufman::new(&a).unwrap();
    assert!(factor.pivots().iter().all(|p| matches!(p, Pivot::Double(_))));
    let b = MatrixDense::column_vector(&[3.0, 5.0]);
    let x = factor.solve(&b).unwrap();
    assert!(x.equals(&MatrixDense::column_vector(&[5.0, 3.0]), 1e-12));
}

#[test]
fn asymmetric_input_is_rejected() {
    let a = dense(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(ErrorCode::NotSymmetric, FactorBunchKaufman::new(&a).unwrap_err().code);
    let a = dense(2, 3, &[1.0; 6]);
    assert_eq!(ErrorCode::NotSquare, FactorBunchKaufman::new(&a).unwrap_err().code);
}

fn shaped_values() -> impl Strategy<Value = (usize, usize, Vec<f64>)> {
    (1usize..6, 1usize..6).prop_flat_map(|(rows, columns)| {
        (
            Just(rows),
            Just(columns),
            prop::collection::vec(-10.0f64..10.0, rows * columns),
        )
    })
}

fn sparse_elements() -> impl Strategy<Value = (usize, usize, f64, Vec<(usize, usize, f64)>)> {
    (1usize..8, 1usize..8, -5.0f64..5.0).prop_flat_map(|(rows, columns, empty)| {
        (
            Just(rows),
            Just(columns),
            Just(empty),
            prop::collection::vec((0..rows, 0..columns, -100.0f64..100.0), 0..10),
        )
    })
}

fn symmetric_values() -> impl Strategy<Value = (usize, Vec<f64>, Vec<f64>)> {
    (1usize..7).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(-1.0f64..1.0, n * n),
            prop::collection::vec(-10.0f64..10.0, n),
        )
    })
}

proptest! {
    #[test]
    fn qr_reproduces_the_permuted_matrix((rows, columns, values) in shaped_values()) {
        let a = dense(rows, columns, &values);
        let qr = FactorQr::new(&a);
        let product = qr.q().multiply(&qr.r());
        prop_assert!(product.equals(&permuted(&a, qr.permutation()), 1e-9));

        // R's diagonal never grows in magnitude
        let diagonal = qr.r_diagonal();
        for pair in diagonal.windows(2) {
            prop_assert!(pair[1].abs() <= pair[0].abs() + 1e-9);
        }
    }

    #[test]
    fn sparse_text_keeps_shape_and_empty_value((rows, columns, empty, elements) in sparse_elements()) {
        let mut m = MatrixSparse::with_empty(rows, columns, empty);
        for (r, c, v) in elements {
            m.set(r, c, v);
        }
        let Matrix::Sparse(loaded) = Matrix::load(&Matrix::Sparse(m.clone()).to_string()).unwrap() else {
            panic!("sparse text loaded as another representation");
        };
        prop_assert_eq!((rows, columns), (loaded.rows(), loaded.columns()));
        prop_assert_eq!(empty, loaded.empty_value());
        prop_assert_eq!(m, loaded);
    }

    #[test]
    fn bunch_kaufman_solves_symmetric_systems((n, values, rhs) in symmetric_values()) {
        let a = symmetric(n, &values);
        let b = MatrixDense::column_vector(&rhs);
        let x = FactorBunchKaufman::new(&a).unwrap().solve(&b).unwrap();
        prop_assert!(a.multiply(&x).equals(&b, 1e-9));
    }
}
