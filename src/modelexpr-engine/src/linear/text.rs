// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Text form of matrices.
//!
//! Dense: `[a, b; c, d]`.  Rows are separated by `;` or newlines and values
//! by commas or whitespace.  Short rows are padded with zeros.  A `~` before
//! the opening bracket transposes the matrix as it is loaded.
//!
//! Sparse: a header line `Sparse rows,columns,empty`, then one
//! `row,column,value` line per stored element.  The empty value may be
//! left off the header and defaults to zero.  A bare `Sparse` header takes
//! the smallest shape holding every element.

use crate::common::Result;
use crate::linear::dense::MatrixDense;
use crate::linear::matrix::Matrix;
use crate::linear::sparse::MatrixSparse;
use crate::linear_err;

const SPARSE_HEADER: &str = "Sparse";

pub fn render_dense(m: &MatrixDense) -> String {
    if m.is_empty() {
        return "[]".to_owned();
    }
    let mut result = String::from("[");
    for r in 0..m.rows() {
        if r > 0 {
            result.push(';');
        }
        for c in 0..m.columns() {
            if c > 0 {
                result.push(',');
            }
            result.push_str(&format!("{}", m.get(r, c)));
        }
    }
    result.push(']');
    result
}

pub fn render_sparse(m: &MatrixSparse) -> String {
    let mut result = format!(
        "{SPARSE_HEADER} {},{},{}\n",
        m.rows(),
        m.columns(),
        m.empty_value()
    );
    for (r, c, v) in m.iter() {
        result.push_str(&format!("{r},{c},{v}\n"));
    }
    result
}

fn parse_value(token: &str) -> Result<f64> {
    match token.parse::<f64>() {
        Ok(v) => Ok(v),
        Err(_) => linear_err!(BadMatrixText, format!("'{token}' is not a number")),
    }
}

pub fn load(source: &str) -> Result<Matrix> {
    let source = source.trim();
    if let Some(rest) = source.strip_prefix(SPARSE_HEADER) {
        return Ok(Matrix::Sparse(load_sparse(rest)?));
    }
    Ok(Matrix::Dense(load_dense(source)?))
}

fn load_dense(source: &str) -> Result<MatrixDense> {
    let (transpose, rest) = match source.strip_prefix('~') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, source),
    };
    let Some(body) = rest.strip_prefix('[') else {
        return linear_err!(BadMatrixText, "expected '['".to_owned());
    };
    let Some(body) = body.trim_end().strip_suffix(']') else {
        return linear_err!(BadMatrixText, "expected ']'".to_owned());
    };

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for line in body.split([';', '\n']) {
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(parse_value)
            .collect::<Result<Vec<f64>>>()?;
        if !row.is_empty() {
            rows.push(row);
        }
    }

    let m = MatrixDense::from_rows(&rows);
    Ok(if transpose { m.transpose().compact() } else { m })
}

fn sparse_shape(header: &str) -> Result<Option<(usize, usize, f64)>> {
    let header = header.trim();
    if header.is_empty() {
        return Ok(None);
    }
    let fields: Vec<&str> = header.split(',').map(str::trim).collect();
    let (rows, columns, empty) = match fields.as_slice() {
        &[rows, columns] => (rows, columns, 0.0),
        &[rows, columns, empty] => (rows, columns, parse_value(empty)?),
        _ => {
            return linear_err!(
                BadMatrixText,
                format!("expected rows,columns[,empty] but got '{header}'")
            );
        }
    };
    let (Ok(rows), Ok(columns)) = (rows.parse::<usize>(), columns.parse::<usize>()) else {
        return linear_err!(BadMatrixText, format!("bad shape in '{header}'"));
    };
    Ok(Some((rows, columns, empty)))
}

fn load_sparse(body: &str) -> Result<MatrixSparse> {
    let (header, elements) = body.split_once('\n').unwrap_or((body, ""));
    let shape = sparse_shape(header)?;
    let mut result = match shape {
        Some((rows, columns, empty)) => MatrixSparse::with_empty(rows, columns, empty),
        None => MatrixSparse::default(),
    };
    for line in elements.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let &[row, column, value] = fields.as_slice() else {
            return linear_err!(
                BadMatrixText,
                format!("expected row,column,value but got '{line}'")
            );
        };
        let (Ok(row), Ok(column)) = (row.parse::<usize>(), column.parse::<usize>()) else {
            return linear_err!(BadMatrixText, format!("bad index in '{line}'"));
        };
        if let Some((rows, columns, _)) = shape {
            if row >= rows || column >= columns {
                return linear_err!(BadMatrixText, format!("'{line}' lies outside {rows}x{columns}"));
            }
        }
        result.set(row, column, parse_value(value)?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use proptest::prelude::*;

    #[test]
    fn test_load_dense() {
        let m = load("[1,2;3,4]").unwrap();
        assert_eq!(2, m.rows());
        assert_eq!(2, m.columns());
        assert_eq!(3.0, m.get(1, 0));
        assert!(matches!(m, Matrix::Dense(_)));
    }

    #[test]
    fn test_load_variants() {
        let m = load("[1 2 3\n 4 5]").unwrap();
        assert_eq!(2, m.rows());
        assert_eq!(3, m.columns());
        assert_eq!(0.0, m.get(1, 2));

        let m = load("~[1,2,3]").unwrap();
        assert_eq!(3, m.rows());
        assert_eq!(1, m.columns());
        assert_eq!(3.0, m.get(2, 0));

        let m = load("[ -1.5e2 , 0.25 ; ]").unwrap();
        assert_eq!(1, m.rows());
        assert_eq!(-150.0, m.get(0, 0));

        assert!(load("[]").unwrap().is_empty());
    }

    #[test]
    fn test_load_errors() {
        for bad in [
            "1,2",
            "[1,2",
            "[1,x]",
            "Sparse\n1,2",
            "Sparse\n-1,0,3",
            "Sparse 2\n0,0,1",
            "Sparse 2,2,0\n2,0,1",
        ] {
            let err = load(bad).unwrap_err();
            assert_eq!(ErrorCode::BadMatrixText, err.code, "{bad}");
        }
    }

    #[test]
    fn test_sparse_text() {
        let m = load("Sparse\n0,1,2.5\n3,0,-1\n").unwrap();
        assert_eq!(4, m.rows());
        assert_eq!(2, m.columns());
        assert_eq!(2.5, m.get(0, 1));
        assert_eq!(-1.0, m.get(3, 0));
        assert_eq!("Sparse 4,2,0\n3,0,-1\n0,1,2.5\n", m.to_string());

        let m = load("Sparse 5,3,-1\n1,2,4\n").unwrap();
        assert_eq!((5, 3), (m.rows(), m.columns()));
        assert_eq!(-1.0, m.get(4, 0));
        assert_eq!(4.0, m.get(1, 2));
        assert_eq!("Sparse 5,3,-1\n1,2,4\n", m.to_string());

        let m = load("Sparse 3,3").unwrap();
        assert_eq!((3, 3), (m.rows(), m.columns()));
        assert_eq!(0.0, m.get(2, 2));
    }

    #[test]
    fn test_render() {
        let m = MatrixDense::from_rows(&[vec![1.0, 0.5], vec![-3.0, 1e-7]]);
        assert_eq!("[1,0.5;-3,0.0000001]", render_dense(&m));
        assert_eq!("[]", render_dense(&MatrixDense::new(3, 0)));
        assert_eq!("[1;-3]", render_dense(&m.column(0).transpose().transpose()));
    }

    proptest! {
        #[test]
        fn text_round_trip(
            rows in 1usize..5,
            columns in 1usize..5,
            values in prop::collection::vec(-1e6f64..1e6, 16),
        ) {
            let data: Vec<f64> = values.into_iter().take(rows * columns).collect();
            prop_assume!(data.len() == rows * columns);
            let m = MatrixDense::from_column_major(rows, columns, data).unwrap();
            let loaded = load(&render_dense(&m)).unwrap();
            prop_assert_eq!(Matrix::Dense(m), loaded);
        }
    }
}
