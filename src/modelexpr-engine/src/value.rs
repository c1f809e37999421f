// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Runtime values produced by evaluating expressions.
//!
//! Values are immutable: every operation here builds a new `Value`.  When
//! the two operands of a binary operation have different kinds, the result
//! takes the kind that ranks higher in [`ValueKind`].

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorKind, Result};
use crate::eval_err;
use crate::linear::{Matrix, MatrixDense};

/// Value kinds in promotion order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Scalar,
    Text,
    Matrix,
    Instance,
}

impl ValueKind {
    pub fn better_than(self, other: ValueKind) -> bool {
        self > other
    }

    /// Kind of the result when operands of kinds `self` and `other` meet.
    pub fn promote(self, other: ValueKind) -> ValueKind {
        if other.better_than(self) { other } else { self }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Scalar => "scalar",
            ValueKind::Text => "text",
            ValueKind::Matrix => "matrix",
            ValueKind::Instance => "instance",
        };
        write!(f, "{name}")
    }
}

/// Opaque handle to a runtime object.  Two handles are equal only if they
/// refer to the same object.
#[derive(Clone)]
pub struct InstanceRef {
    label: String,
    object: Rc<dyn Any>,
}

impl InstanceRef {
    pub fn new<T: Any>(label: &str, object: T) -> Self {
        InstanceRef {
            label: label.to_owned(),
            object: Rc::new(object),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }
}

impl PartialEq for InstanceRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.object), Rc::as_ptr(&other.object))
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceRef({})", self.label)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(f64),
    Text(String),
    Matrix(Matrix),
    Instance(InstanceRef),
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(0.0)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Scalar(v as i8 as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Matrix> for Value {
    fn from(m: Matrix) -> Self {
        Value::Matrix(m)
    }
}

impl From<MatrixDense> for Value {
    fn from(m: MatrixDense) -> Self {
        Value::Matrix(Matrix::Dense(m))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Matrix(m) => write!(f, "{m}"),
            Value::Instance(i) => write!(f, "{}", i.label),
        }
    }
}

fn mismatch<T>(op: &str, l: &Value, r: &Value) -> Result<T> {
    eval_err!(
        TypeMismatch,
        format!("{} {} {}", l.kind(), op, r.kind())
    )
}

fn floor_mod(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Text(_) => ValueKind::Text,
            Value::Matrix(_) => ValueKind::Matrix,
            Value::Instance(_) => ValueKind::Instance,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Value::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// Truth value used by conditions and logical operators.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Scalar(v) => *v != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Matrix(m) => m.any(),
            Value::Instance(_) => true,
        }
    }

    /// Apply `f` elementwise, broadcasting scalars over matrices and using
    /// overlap semantics between two matrices.
    fn arithmetic(&self, other: &Value, op: &str, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Scalar(a), Scalar(b)) => Ok(Scalar(f(*a, *b))),
            (Scalar(a), Matrix(m)) => Ok(Matrix(m.map(|v| f(*a, v)))),
            (Matrix(m), Scalar(b)) => Ok(Matrix(m.map(|v| f(v, *b)))),
            (Matrix(a), Matrix(b)) => Ok(Matrix(a.zip(b, f))),
            _ => mismatch(op, self, other),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Text(_), _) | (_, Value::Text(_)) => Ok(Value::Text(format!("{self}{other}"))),
            _ => self.arithmetic(other, "+", |a, b| a + b),
        }
    }

    pub fn subtract(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "-", |a, b| a - b)
    }

    /// Matrix product when both sides are matrices, otherwise elementwise.
    pub fn multiply(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(a.multiply(b))),
            _ => self.arithmetic(other, "*", |a, b| a * b),
        }
    }

    pub fn multiply_elementwise(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "&", |a, b| a * b)
    }

    pub fn divide(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "/", |a, b| a / b)
    }

    pub fn modulo(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "%", floor_mod)
    }

    pub fn power(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "^", f64::powf)
    }

    pub fn min(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "min", f64::min)
    }

    pub fn max(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "max", f64::max)
    }

    pub fn and(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "&&", |a, b| (a != 0.0 && b != 0.0) as i8 as f64)
    }

    pub fn or(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, "||", |a, b| (a != 0.0 || b != 0.0) as i8 as f64)
    }

    pub fn negate(&self) -> Result<Value> {
        match self {
            Value::Scalar(v) => Ok(Value::Scalar(-v)),
            Value::Matrix(m) => Ok(Value::Matrix(m.map(|v| -v))),
            _ => eval_err!(TypeMismatch, format!("-{}", self.kind())),
        }
    }

    /// Logical not of a scalar.  For a matrix this is the inverse.
    pub fn not(&self) -> Result<Value> {
        match self {
            Value::Scalar(v) => Ok(Value::Scalar((*v == 0.0) as i8 as f64)),
            Value::Matrix(m) => match m.inverse() {
                Ok(inverse) => Ok(Value::Matrix(inverse)),
                Err(err) => Err(Error::new(ErrorKind::Evaluation, err.code, err.details)),
            },
            _ => eval_err!(TypeMismatch, format!("!{}", self.kind())),
        }
    }

    pub fn transpose(&self) -> Result<Value> {
        match self {
            Value::Scalar(_) => Ok(self.clone()),
            Value::Matrix(m) => Ok(Value::Matrix(m.transpose())),
            _ => eval_err!(TypeMismatch, format!("{}'", self.kind())),
        }
    }

    /// Compare two values.  `numeric` decides numbers, `text` decides
    /// strings.  Matrices compare elementwise into a 0/1 matrix shaped like
    /// the matrix operand on the left (or the only matrix operand).
    pub fn compare(
        &self,
        other: &Value,
        op: &str,
        numeric: impl Fn(f64, f64) -> bool,
        text: impl Fn(&str, &str) -> bool,
    ) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Scalar(a), Scalar(b)) => Ok(numeric(*a, *b).into()),
            (Matrix(a), Matrix(b)) => Ok(Matrix(a.compare(b, numeric))),
            (Matrix(m), Scalar(b)) => Ok(Matrix(m.compare_scalar(*b, numeric))),
            (Scalar(a), Matrix(m)) => Ok(Matrix(m.map(|v| numeric(*a, v) as i8 as f64))),
            (Instance(_), _) | (_, Instance(_)) => {
                let same = self == other;
                match op {
                    "==" => Ok(same.into()),
                    "!=" => Ok((!same).into()),
                    _ => mismatch(op, self, other),
                }
            }
            (Text(_), _) | (_, Text(_)) => Ok(text(&self.to_string(), &other.to_string()).into()),
        }
    }

    pub fn equal(&self, other: &Value) -> Result<Value> {
        self.compare(other, "==", |a, b| approx_eq!(f64, a, b), |a, b| a == b)
    }

    pub fn not_equal(&self, other: &Value) -> Result<Value> {
        self.compare(other, "!=", |a, b| !approx_eq!(f64, a, b), |a, b| a != b)
    }

    pub fn less(&self, other: &Value) -> Result<Value> {
        self.compare(other, "<", |a, b| a < b, |a, b| a < b)
    }

    pub fn less_equal(&self, other: &Value) -> Result<Value> {
        self.compare(other, "<=", |a, b| a <= b, |a, b| a <= b)
    }

    pub fn greater(&self, other: &Value) -> Result<Value> {
        self.compare(other, ">", |a, b| a > b, |a, b| a > b)
    }

    pub fn greater_equal(&self, other: &Value) -> Result<Value> {
        self.compare(other, ">=", |a, b| a >= b, |a, b| a >= b)
    }
}
