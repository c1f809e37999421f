// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::common::{Error, ErrorKind, Result};
use crate::equations::EquationSet;
use crate::eval_err;
use crate::linear::{Matrix, MatrixDense, Sampling};
use crate::op::{BinaryOp, Builtin, ComparisonOp, ExprTree, LogicalOp, NodeId, OpKind, UnaryOp, VarRef};
use crate::value::{Value, ValueKind};

/// Supplies the current values of variables during evaluation.
pub trait EvalContext {
    fn get(&self, var: &VarRef) -> Result<Value>;
}

/// Context for static evaluation: any variable read fails.
pub struct NoContext;

impl EvalContext for NoContext {
    fn get(&self, var: &VarRef) -> Result<Value> {
        eval_err!(
            NoInstanceContext,
            format!("'{}' read without an instance", var.name)
        )
    }
}

impl EvalContext for HashMap<String, Value> {
    fn get(&self, var: &VarRef) -> Result<Value> {
        match HashMap::get(self, &var.name) {
            Some(value) => Ok(value.clone()),
            None => eval_err!(UndefinedVariable, var.name.clone()),
        }
    }
}

fn as_evaluation_error(err: Error) -> Error {
    Error::new(ErrorKind::Evaluation, err.code, err.details)
}

fn index(value: &Value) -> Result<f64> {
    match value {
        Value::Scalar(v) => Ok(*v),
        _ => eval_err!(TypeMismatch, format!("{} used as an index", value.kind())),
    }
}

pub fn eval_tree(tree: &ExprTree, ctx: &dyn EvalContext) -> Result<Value> {
    eval(tree, tree.root(), ctx)
}

pub fn eval(tree: &ExprTree, id: NodeId, ctx: &dyn EvalContext) -> Result<Value> {
    let children = tree.children(id);
    match tree.kind(id) {
        OpKind::Constant { value, .. } => Ok(value.clone()),
        OpKind::Variable(var) => ctx.get(var),
        OpKind::ElementAccess { sampling } => {
            let target = eval(tree, children[0], ctx)?;
            let indices = children[1..]
                .iter()
                .map(|&c| eval(tree, c, ctx).and_then(|v| index(&v)))
                .collect::<Result<Vec<f64>>>()?;
            element(&target, &indices, *sampling)
        }
        OpKind::Unary(op) => {
            let operand = eval(tree, children[0], ctx)?;
            match op {
                UnaryOp::Negate => operand.negate(),
                UnaryOp::Not => operand.not(),
                UnaryOp::Transpose => operand.transpose(),
            }
        }
        OpKind::Binary(op) => {
            let l = eval(tree, children[0], ctx)?;
            let r = eval(tree, children[1], ctx)?;
            match op {
                BinaryOp::Add => l.add(&r),
                BinaryOp::Subtract => l.subtract(&r),
                BinaryOp::Multiply => l.multiply(&r),
                BinaryOp::MultiplyElementwise => l.multiply_elementwise(&r),
                BinaryOp::Divide => l.divide(&r),
                BinaryOp::Modulo => l.modulo(&r),
                BinaryOp::Power => l.power(&r),
            }
        }
        OpKind::Comparison(op) => {
            let l = eval(tree, children[0], ctx)?;
            let r = eval(tree, children[1], ctx)?;
            match op {
                ComparisonOp::Lt => l.less(&r),
                ComparisonOp::Le => l.less_equal(&r),
                ComparisonOp::Gt => l.greater(&r),
                ComparisonOp::Ge => l.greater_equal(&r),
                ComparisonOp::Eq => l.equal(&r),
                ComparisonOp::Ne => l.not_equal(&r),
            }
        }
        OpKind::Logical(op) => {
            let l = eval(tree, children[0], ctx)?;
            // scalars short-circuit
            if let Value::Scalar(v) = l {
                match op {
                    LogicalOp::And if v == 0.0 => return Ok(Value::Scalar(0.0)),
                    LogicalOp::Or if v != 0.0 => return Ok(Value::Scalar(1.0)),
                    _ => {}
                }
            }
            let r = eval(tree, children[1], ctx)?;
            match op {
                LogicalOp::And => l.and(&r),
                LogicalOp::Or => l.or(&r),
            }
        }
        OpKind::MatrixBuild { rows, columns } => {
            let mut data = vec![0.0; rows * columns];
            for (i, &child) in children.iter().enumerate() {
                let v = match eval(tree, child, ctx)? {
                    Value::Scalar(v) => v,
                    other => {
                        return eval_err!(
                            TypeMismatch,
                            format!("{} inside a matrix literal", other.kind())
                        );
                    }
                };
                let (r, c) = (i / columns, i % columns);
                data[c * rows + r] = v;
            }
            Ok(MatrixDense::from_column_major(*rows, *columns, data)?.into())
        }
        OpKind::Split { parts } => eval_err!(
            UnsupportedOperation,
            format!("split({}) has no value", parts.join(", "))
        ),
        OpKind::Function(builtin) => {
            let args = children
                .iter()
                .map(|&c| eval(tree, c, ctx))
                .collect::<Result<Vec<Value>>>()?;
            call_builtin(*builtin, &args)
        }
    }
}

/// Read from `target`.  One index selects a row of the first column; two
/// select (row, column).  A scalar target reads as itself.
pub fn element(target: &Value, indices: &[f64], sampling: Sampling) -> Result<Value> {
    match target {
        Value::Scalar(_) => Ok(target.clone()),
        Value::Matrix(m) => {
            let row = indices.first().copied().unwrap_or(0.0);
            let column = indices.get(1).copied().unwrap_or(0.0);
            Ok(Value::Scalar(m.sample(row, column, sampling)))
        }
        _ => eval_err!(
            TypeMismatch,
            format!("element of {}", target.kind())
        ),
    }
}

fn map_numeric(value: &Value, builtin: Builtin, f: impl Fn(f64) -> f64) -> Result<Value> {
    match value {
        Value::Scalar(v) => Ok(Value::Scalar(f(*v))),
        Value::Matrix(m) => Ok(Value::Matrix(m.map(f))),
        _ => eval_err!(
            TypeMismatch,
            format!("{}({})", builtin.name(), value.kind())
        ),
    }
}

fn matrix_arg(value: &Value, builtin: Builtin) -> Result<Matrix> {
    match value {
        Value::Scalar(v) => Ok(MatrixDense::filled(1, 1, *v).into()),
        Value::Matrix(m) => Ok(m.clone()),
        _ => eval_err!(
            TypeMismatch,
            format!("{}({})", builtin.name(), value.kind())
        ),
    }
}

pub fn call_builtin(builtin: Builtin, args: &[Value]) -> Result<Value> {
    let (min, max) = builtin.arity();
    if args.len() < min || args.len() > max {
        return eval_err!(
            BadArity,
            format!("{} called with {} arguments", builtin.name(), args.len())
        );
    }
    let first = &args[0];
    match builtin {
        Builtin::Abs => map_numeric(first, builtin, f64::abs),
        Builtin::Sqrt => map_numeric(first, builtin, f64::sqrt),
        Builtin::Exp => map_numeric(first, builtin, f64::exp),
        Builtin::Log => map_numeric(first, builtin, f64::ln),
        Builtin::Sin => map_numeric(first, builtin, f64::sin),
        Builtin::Cos => map_numeric(first, builtin, f64::cos),
        Builtin::Tan => map_numeric(first, builtin, f64::tan),
        Builtin::Floor => map_numeric(first, builtin, f64::floor),
        Builtin::Ceil => map_numeric(first, builtin, f64::ceil),
        Builtin::Round => map_numeric(first, builtin, f64::round),
        Builtin::Min | Builtin::Max => {
            if args.len() == 1 {
                let m = matrix_arg(first, builtin)?.to_dense();
                let extreme = if builtin == Builtin::Min {
                    m.min_element()
                } else {
                    m.max_element()
                };
                return Ok(Value::Scalar(extreme.unwrap_or(0.0)));
            }
            let mut result = first.clone();
            for arg in &args[1..] {
                result = if builtin == Builtin::Min {
                    result.min(arg)?
                } else {
                    result.max(arg)?
                };
            }
            Ok(result)
        }
        Builtin::Norm => {
            let p = match args.get(1) {
                Some(p) => index(p)?,
                None => 2.0,
            };
            Ok(Value::Scalar(matrix_arg(first, builtin)?.norm(p)))
        }
        Builtin::Det => {
            let m = matrix_arg(first, builtin)?;
            Ok(Value::Scalar(m.determinant().map_err(as_evaluation_error)?))
        }
        Builtin::Sum => Ok(Value::Scalar(matrix_arg(first, builtin)?.sum())),
        Builtin::Rows => Ok(Value::Scalar(matrix_arg(first, builtin)?.rows() as f64)),
        Builtin::Cols => Ok(Value::Scalar(matrix_arg(first, builtin)?.columns() as f64)),
    }
}

/// Kind of value a node produces, decided without evaluating it.
pub fn static_type(tree: &ExprTree, id: NodeId, set: &EquationSet) -> ValueKind {
    let children = tree.children(id);
    let child = |i: usize| static_type(tree, children[i], set);
    match tree.kind(id) {
        OpKind::Constant { value, .. } => value.kind(),
        OpKind::Variable(var) => set.get(var.id).ty,
        OpKind::ElementAccess { .. } => match child(0) {
            ValueKind::Matrix => ValueKind::Scalar,
            kind => kind,
        },
        OpKind::Unary(_) => child(0),
        // text absorbs whatever it is added to
        OpKind::Binary(BinaryOp::Add) if child(0) == ValueKind::Text || child(1) == ValueKind::Text => {
            ValueKind::Text
        }
        OpKind::Binary(_) => child(0).promote(child(1)),
        OpKind::Comparison(_) | OpKind::Logical(_) => {
            if child(0) == ValueKind::Matrix || child(1) == ValueKind::Matrix {
                ValueKind::Matrix
            } else {
                ValueKind::Scalar
            }
        }
        OpKind::MatrixBuild { .. } => ValueKind::Matrix,
        OpKind::Split { .. } => ValueKind::Instance,
        OpKind::Function(builtin) => match builtin {
            Builtin::Norm | Builtin::Det | Builtin::Sum | Builtin::Rows | Builtin::Cols => {
                ValueKind::Scalar
            }
            Builtin::Min | Builtin::Max if children.len() == 1 => ValueKind::Scalar,
            Builtin::Min | Builtin::Max => (0..children.len())
                .map(child)
                .fold(ValueKind::Scalar, ValueKind::promote),
            _ => child(0),
        },
    }
}

/// Record the static type of every node in `tree`.
pub fn annotate_types(tree: &mut ExprTree, set: &EquationSet) {
    for id in tree.preorder(tree.root()) {
        let ty = static_type(tree, id, set);
        tree.node_mut(id).ty = Some(ty);
    }
}
