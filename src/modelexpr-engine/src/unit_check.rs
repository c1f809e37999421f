// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::mem;

use tracing::warn;

use crate::common::Result;
use crate::equations::{Equation, EquationSet};
use crate::op::{BinaryOp, Builtin, ExprTree, NodeId, OpKind};
use crate::render::render;
use crate::unit_err;
use crate::units::UnitMap;

/// A place where two units that should agree do not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitMismatch {
    pub variable: String,
    pub expected: UnitMap,
    pub found: UnitMap,
    /// Rendering of the expression the mismatch was found in.
    pub context: String,
}

/// Computes the unit of every node of a tree.  Dimensionless operands are
/// compatible with any unit, so literals without an annotation never
/// cause a mismatch.
struct UnitEvaluator<'a> {
    set: &'a EquationSet,
    strict: bool,
    variable: String,
    mismatches: Vec<UnitMismatch>,
}

impl UnitEvaluator<'_> {
    fn mismatch(&mut self, tree: &ExprTree, id: NodeId, expected: &UnitMap, found: &UnitMap) -> Result<()> {
        let context = render(tree, id);
        if self.strict {
            return unit_err!(
                UnitMismatch,
                format!("{expected} vs {found} in '{context}'")
            );
        }
        warn!(variable = %self.variable, %expected, %found, %context, "unit mismatch");
        self.mismatches.push(UnitMismatch {
            variable: self.variable.clone(),
            expected: expected.clone(),
            found: found.clone(),
            context,
        });
        Ok(())
    }

    /// Unit of operands that are added or compared.
    fn combine(&mut self, tree: &ExprTree, id: NodeId, a: UnitMap, b: UnitMap) -> Result<UnitMap> {
        if a.is_dimensionless() {
            return Ok(b);
        }
        if !b.is_dimensionless() && a != b {
            self.mismatch(tree, id, &a, &b)?;
        }
        Ok(a)
    }

    /// `unit` raised to `power`, or None if that needs fractional
    /// exponents.
    fn raise(unit: &UnitMap, power: f64) -> Option<UnitMap> {
        if power.fract() == 0.0 {
            return Some(unit.clone().exp(power as i32));
        }
        let doubled = power * 2.0;
        if doubled.fract() != 0.0 || unit.map.values().any(|exp| exp % 2 != 0) {
            return None;
        }
        let halved: UnitMap = unit.map.iter().map(|(name, exp)| (name.clone(), exp / 2)).collect();
        Some(halved.exp(doubled as i32))
    }

    fn power(&mut self, tree: &ExprTree, id: NodeId, base: UnitMap, exponent: Option<f64>) -> Result<UnitMap> {
        if base.is_dimensionless() {
            return Ok(base);
        }
        if let Some(unit) = exponent.and_then(|p| Self::raise(&base, p)) {
            return Ok(unit);
        }
        self.mismatch(tree, id, &UnitMap::dimensionless(), &base)?;
        Ok(UnitMap::dimensionless())
    }

    fn determine(&mut self, tree: &mut ExprTree, id: NodeId) -> Result<UnitMap> {
        let children: Vec<NodeId> = tree.children(id).to_vec();
        let mut units = Vec::with_capacity(children.len());
        for &child in children.iter() {
            units.push(self.determine(tree, child)?);
        }

        let unit = match tree.kind(id).clone() {
            OpKind::Constant { .. } => tree.node(id).unit.clone().unwrap_or_default(),
            OpKind::Variable(var) => self.set.get(var.id).unit.clone().unwrap_or_default(),
            OpKind::ElementAccess { .. } | OpKind::Unary(_) => units.swap_remove(0),
            OpKind::Binary(op) => {
                let right = units.pop().unwrap_or_default();
                let left = units.pop().unwrap_or_default();
                match op {
                    BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Modulo => {
                        self.combine(tree, id, left, right)?
                    }
                    BinaryOp::Multiply | BinaryOp::MultiplyElementwise => left * right,
                    BinaryOp::Divide => left / right,
                    BinaryOp::Power => {
                        let exponent = tree.constant_scalar(children[1]);
                        self.power(tree, id, left, exponent)?
                    }
                }
            }
            OpKind::Comparison(_) => {
                let right = units.pop().unwrap_or_default();
                let left = units.pop().unwrap_or_default();
                self.combine(tree, id, left, right)?;
                UnitMap::dimensionless()
            }
            OpKind::Logical(_) | OpKind::Split { .. } => UnitMap::dimensionless(),
            OpKind::MatrixBuild { .. } => {
                let mut result = UnitMap::dimensionless();
                for unit in units {
                    result = self.combine(tree, id, result, unit)?;
                }
                result
            }
            OpKind::Function(builtin) => match builtin {
                Builtin::Exp
                | Builtin::Log
                | Builtin::Sin
                | Builtin::Cos
                | Builtin::Tan
                | Builtin::Rows
                | Builtin::Cols => UnitMap::dimensionless(),
                Builtin::Sqrt => {
                    let operand = units.swap_remove(0);
                    self.power(tree, id, operand, Some(0.5))?
                }
                Builtin::Min | Builtin::Max => {
                    let mut result = UnitMap::dimensionless();
                    for unit in units {
                        result = self.combine(tree, id, result, unit)?;
                    }
                    result
                }
                Builtin::Norm => units.swap_remove(0),
                Builtin::Abs
                | Builtin::Floor
                | Builtin::Ceil
                | Builtin::Round
                | Builtin::Det
                | Builtin::Sum => units.swap_remove(0),
            },
        };
        tree.node_mut(id).unit = Some(unit.clone());
        Ok(unit)
    }
}

/// Compute and record the unit of every node of `tree`.  With `strict`,
/// incompatible operands are an error; otherwise they are logged.
pub fn determine_units(tree: &mut ExprTree, set: &EquationSet, strict: bool) -> Result<UnitMap> {
    let mut evaluator = UnitEvaluator {
        set,
        strict,
        variable: String::new(),
        mismatches: vec![],
    };
    let root = tree.root();
    evaluator.determine(tree, root)
}

fn check_equations(
    evaluator: &mut UnitEvaluator,
    equations: &mut [Equation],
    declared: Option<&UnitMap>,
) -> Result<()> {
    for equation in equations.iter_mut() {
        if let Some(condition) = equation.condition.as_mut() {
            let root = condition.root();
            evaluator.determine(condition, root)?;
        }
        let root = equation.expression.root();
        let found = evaluator.determine(&mut equation.expression, root)?;
        if let Some(expected) = declared {
            if !found.is_dimensionless() && &found != expected {
                evaluator.mismatch(&equation.expression, root, expected, &found)?;
            }
        }
    }
    Ok(())
}

/// Annotate every equation of `set` with units and compare each result
/// against the variable's declared unit.  Returns the mismatches found;
/// with `strict` the first one is returned as an error instead.
pub fn check_units(set: &mut EquationSet, strict: bool) -> Result<Vec<UnitMismatch>> {
    let mut mismatches = vec![];
    for id in set.ids() {
        let mut equations = mem::take(&mut set.get_mut(id).equations);
        let set_ref = &*set;
        let var = set_ref.get(id);
        let mut evaluator = UnitEvaluator {
            set: set_ref,
            strict,
            variable: var.full_name(),
            mismatches: vec![],
        };
        let outcome = check_equations(&mut evaluator, &mut equations, var.unit.as_ref());
        mismatches.append(&mut evaluator.mismatches);
        set.get_mut(id).equations = equations;
        outcome?;
    }
    Ok(mismatches)
}
