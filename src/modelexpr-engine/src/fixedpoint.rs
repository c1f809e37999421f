// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Fixed-point exponent analysis.
//!
//! Every node gets an `exponent` and a `center`: its value is stored as an
//! integer mantissa times `2^exponent`, and bit `center` of the mantissa
//! is where the value's most significant bit is expected.  The sum
//! `exponent + center` is the node's magnitude, the power of two of the
//! largest value it is expected to hold.
//!
//! The bottom-up pass derives each node's exponent from its operands and
//! is repeated until no node or variable changes.  A node is resolved once,
//! as soon as its operands are; afterwards only alignment moves constant
//! operands.  Variables take the largest magnitude of their equations,
//! raised by any bound observed in comparisons, and never shrink; access
//! nodes follow them.  A final top-down pass records in `exponent_next`
//! the exponent each consumer wants its operands in.

use std::f64::consts::LOG2_10;
use std::mem;

use tracing::{debug, trace};

use crate::analysis_err;
use crate::common::Result;
use crate::config::AnalysisConfig;
use crate::equations::{Equation, EquationSet, VarId};
use crate::eval::static_type;
use crate::op::{BinaryOp, Builtin, ExprTree, NodeId, OpKind, UNKNOWN, UnaryOp};
use crate::progress::Progress;
use crate::value::{Value, ValueKind};

fn known(tree: &ExprTree, id: NodeId) -> Option<(i32, i32)> {
    let node = tree.node(id);
    if node.exponent == UNKNOWN {
        None
    } else {
        Some((node.exponent, node.center))
    }
}

fn is_zero_constant(tree: &ExprTree, id: NodeId) -> bool {
    tree.constant_scalar(id) == Some(0.0)
}

fn is_nonzero_scalar_constant(tree: &ExprTree, id: NodeId) -> bool {
    matches!(tree.constant_scalar(id), Some(v) if v != 0.0 && v.is_finite())
}

/// The operand with the largest magnitude, ties going to the larger
/// center.  Zero constants are ignored.  None if any other operand is
/// still unresolved.
fn widest(tree: &ExprTree, ids: &[NodeId]) -> Option<(i32, i32)> {
    let mut best: Option<(i32, i32)> = None;
    for &id in ids {
        if is_zero_constant(tree, id) {
            continue;
        }
        let (e, c) = known(tree, id)?;
        best = match best {
            Some((be, bc)) if (be + bc, bc) >= (e + c, c) => Some((be, bc)),
            _ => Some((e, c)),
        };
    }
    Some(best.unwrap_or((0, 0)))
}

/// Largest magnitude, in powers of two, any node may take.  Every finite
/// double fits well inside it.
pub const MAX_MAGNITUDE: i32 = 2048;

fn magnitude_of(value: f64) -> i32 {
    value.abs().log2().floor() as i32
}

/// How far a constant at `exponent` with `center` may move toward
/// `target`.  Raising the exponent drops low mantissa bits, so it stops at
/// the trailing zeros of the mantissa and at the bottom of the center.
/// Lowering it adds high bits and stops when the center reaches `msb`.
pub fn alignment_shift(value: f64, exponent: i32, center: i32, target: i32, msb: i32) -> i32 {
    let shift = target - exponent;
    if shift > 0 {
        let mantissa = (value.abs() * 2f64.powi(-exponent)).round();
        if mantissa < 1.0 || mantissa >= u64::MAX as f64 {
            return 0;
        }
        let trailing = (mantissa as u64).trailing_zeros() as i32;
        shift.min(trailing).min(center.max(0))
    } else if shift < 0 {
        shift.max(-(msb - center)).min(0)
    } else {
        0
    }
}

/// One bottom-up pass over the trees of a single variable.
struct BottomUp<'a> {
    set: &'a EquationSet,
    msb: i32,
    default_digits: u32,
    bounds: Vec<(VarId, f64)>,
    progress: Progress,
}

impl BottomUp<'_> {
    fn default_exponent(&self) -> (i32, i32) {
        (-self.msb / 2, self.msb / 2)
    }

    /// Natural exponent of a literal from its size and written precision.
    fn constant(&self, value: &Value, digits: Option<u32>) -> (i32, i32) {
        let largest = match value {
            Value::Scalar(v) => v.abs(),
            Value::Matrix(m) => m.norm(f64::INFINITY),
            Value::Text(_) | Value::Instance(_) => 0.0,
        };
        if largest == 0.0 || !largest.is_finite() {
            return (0, 0);
        }
        let digits = digits.unwrap_or(self.default_digits);
        let bits = ((digits as f64 * LOG2_10).ceil() as i32).clamp(1, self.msb.max(1));
        let center = (self.msb / 2).max(bits - 1).min(self.msb);
        (magnitude_of(largest) - center, center)
    }

    fn align(&mut self, tree: &mut ExprTree, a: NodeId, b: NodeId) {
        let (constant, sibling) = match (
            is_nonzero_scalar_constant(tree, a),
            is_nonzero_scalar_constant(tree, b),
        ) {
            (true, false) => (a, b),
            (false, true) => (b, a),
            _ => return,
        };
        let (Some((target, _)), Some((exponent, center))) = (known(tree, sibling), known(tree, constant))
        else {
            return;
        };
        let value = tree.constant_scalar(constant).unwrap_or(0.0);
        let shift = alignment_shift(value, exponent, center, target, self.msb);
        if shift != 0 {
            let node = tree.node_mut(constant);
            node.exponent += shift;
            node.center -= shift;
            self.progress = Progress::Changed;
        }
    }

    fn record_bound(&mut self, tree: &ExprTree, a: NodeId, b: NodeId) {
        for (var, constant) in [(a, b), (b, a)] {
            if let (Some(var), Some(value)) = (tree.variable(var), tree.constant_scalar(constant)) {
                self.bounds.push((var.id, value));
            }
        }
    }

    fn determine(&mut self, tree: &mut ExprTree, id: NodeId) -> Result<()> {
        let children: Vec<NodeId> = tree.children(id).to_vec();
        for &child in children.iter() {
            self.determine(tree, child)?;
        }

        // constant operands keep moving toward their siblings after the
        // parent is resolved
        match tree.kind(id) {
            OpKind::Binary(BinaryOp::Add | BinaryOp::Subtract) => {
                self.align(tree, children[0], children[1]);
            }
            OpKind::Comparison(_) => {
                self.align(tree, children[0], children[1]);
                self.record_bound(tree, children[0], children[1]);
            }
            _ => {}
        }

        // variable accesses follow their variable, which only grows;
        // every other node is resolved once
        let tracks_variable = matches!(tree.kind(id), OpKind::Variable(_));
        if !tracks_variable && tree.node(id).exponent != UNKNOWN {
            return Ok(());
        }

        let result = match tree.kind(id).clone() {
            OpKind::Constant { value, digits } => Some(self.constant(&value, digits)),
            OpKind::Variable(var) => {
                let var = self.set.get(var.id);
                if var.exponent == UNKNOWN {
                    None
                } else {
                    Some((var.exponent, var.center))
                }
            }
            OpKind::ElementAccess { .. } => known(tree, children[0]),
            OpKind::Unary(UnaryOp::Negate | UnaryOp::Transpose) => known(tree, children[0]),
            OpKind::Unary(UnaryOp::Not) => {
                if static_type(tree, children[0], self.set) == ValueKind::Matrix {
                    // inverse: the magnitude flips sign
                    known(tree, children[0]).map(|(e, c)| (-(e + c) - c, c))
                } else {
                    Some((0, 0))
                }
            }
            OpKind::Binary(op) => {
                let (l, r) = (children[0], children[1]);
                match op {
                    BinaryOp::Add | BinaryOp::Subtract => widest(tree, &children),
                    BinaryOp::Multiply | BinaryOp::MultiplyElementwise => {
                        match (known(tree, l), known(tree, r)) {
                            (Some((el, cl)), Some((er, cr))) => {
                                let center = (cl + cr) / 2;
                                Some((el + cl + er + cr - center, center))
                            }
                            _ => None,
                        }
                    }
                    BinaryOp::Divide => match (known(tree, l), known(tree, r)) {
                        (Some((el, cl)), Some((er, cr))) => {
                            let center = (cl + cr) / 2;
                            Some((el + cl - (er + cr) - center, center))
                        }
                        _ => None,
                    },
                    BinaryOp::Modulo => known(tree, r),
                    BinaryOp::Power => match (known(tree, l), tree.constant_scalar(r)) {
                        (Some((e, c)), Some(p)) => {
                            let magnitude = ((e + c) as f64 * p).floor();
                            if !magnitude.is_finite() || magnitude.abs() > MAX_MAGNITUDE as f64 {
                                return out_of_range(magnitude);
                            }
                            Some((magnitude as i32 - c, c))
                        }
                        (Some(_), None) => Some(self.default_exponent()),
                        (None, _) => None,
                    },
                }
            }
            OpKind::Comparison(_) | OpKind::Logical(_) | OpKind::Split { .. } => Some((0, 0)),
            OpKind::MatrixBuild { .. } => {
                let mut sum = (0i64, 0i64);
                let mut count = 0i64;
                let mut unresolved = false;
                for &child in children.iter() {
                    if is_zero_constant(tree, child) {
                        continue;
                    }
                    match known(tree, child) {
                        Some((e, c)) => {
                            sum.0 += e as i64;
                            sum.1 += c as i64;
                            count += 1;
                        }
                        None => unresolved = true,
                    }
                }
                if count > 0 {
                    Some(((sum.0 / count) as i32, (sum.1 / count) as i32))
                } else if unresolved {
                    None
                } else {
                    Some(self.default_exponent())
                }
            }
            OpKind::Function(builtin) => match builtin {
                Builtin::Sin | Builtin::Cos => Some((1 - self.msb, self.msb - 1)),
                Builtin::Sqrt => known(tree, children[0]).map(|(e, c)| ((e + c).div_euclid(2) - c, c)),
                Builtin::Abs
                | Builtin::Floor
                | Builtin::Ceil
                | Builtin::Round
                | Builtin::Sum
                | Builtin::Norm => known(tree, children[0]),
                Builtin::Min | Builtin::Max => widest(tree, &children),
                Builtin::Exp | Builtin::Log | Builtin::Tan | Builtin::Det => {
                    Some(self.default_exponent())
                }
                Builtin::Rows | Builtin::Cols => Some((0, self.msb / 2)),
            },
        };

        if let Some((exponent, center)) = result {
            let magnitude = exponent as i64 + center as i64;
            if magnitude.abs() > MAX_MAGNITUDE as i64 {
                return out_of_range(magnitude as f64);
            }
            let node = tree.node_mut(id);
            if (node.exponent, node.center) != (exponent, center) {
                node.exponent = exponent;
                node.center = center;
                self.progress = Progress::Changed;
            }
        }
        Ok(())
    }

    fn equations(&mut self, equations: &mut [Equation]) -> Result<()> {
        for equation in equations.iter_mut() {
            if let Some(condition) = equation.condition.as_mut() {
                let root = condition.root();
                self.determine(condition, root)?;
            }
            let root = equation.expression.root();
            self.determine(&mut equation.expression, root)?;
        }
        Ok(())
    }
}

fn out_of_range(magnitude: f64) -> Result<()> {
    analysis_err!(
        ExponentOutOfRange,
        format!("magnitude 2^{magnitude} is outside +/-2^{MAX_MAGNITUDE}")
    )
}

/// Required exponents, root to leaves.  `required` is what the consumer
/// of `id` wants; operands that are combined without rescaling inherit
/// it, everything else is asked for its own natural exponent.
pub fn propagate_exponents(tree: &mut ExprTree, id: NodeId, required: i32) {
    let required = if required == UNKNOWN {
        tree.node(id).exponent
    } else {
        required
    };
    tree.node_mut(id).exponent_next = required;
    let children: Vec<NodeId> = tree.children(id).to_vec();
    match tree.kind(id).clone() {
        OpKind::Binary(BinaryOp::Add | BinaryOp::Subtract)
        | OpKind::Unary(UnaryOp::Negate | UnaryOp::Transpose)
        | OpKind::MatrixBuild { .. } => {
            for child in children {
                propagate_exponents(tree, child, required);
            }
        }
        OpKind::Comparison(_) => {
            let (l, r) = (children[0], children[1]);
            let (el, er) = (tree.node(l).exponent, tree.node(r).exponent);
            let shared = if el == UNKNOWN || er == UNKNOWN {
                if el == UNKNOWN { er } else { el }
            } else {
                let sum = el + er;
                let mean = sum.div_euclid(2);
                // between two candidates, lean toward the bare variable
                let variable = [(l, el), (r, er)]
                    .into_iter()
                    .find(|&(node, _)| tree.variable(node).is_some());
                match variable {
                    Some((_, exponent)) if sum.rem_euclid(2) == 1 && exponent > mean => mean + 1,
                    _ => mean,
                }
            };
            propagate_exponents(tree, l, shared);
            propagate_exponents(tree, r, shared);
        }
        OpKind::ElementAccess { .. } => {
            propagate_exponents(tree, children[0], UNKNOWN);
            for &index in &children[1..] {
                propagate_exponents(tree, index, 0);
            }
        }
        _ => {
            for child in children {
                propagate_exponents(tree, child, UNKNOWN);
            }
        }
    }
}

pub struct ExponentAnalyzer {
    config: AnalysisConfig,
}

impl ExponentAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        ExponentAnalyzer { config }
    }

    /// Annotate every node and variable of `set` with exponents.  Returns
    /// the number of bottom-up passes made.
    pub fn run(&self, set: &mut EquationSet) -> Result<usize> {
        let mut passes = self.fixpoint(set)?;
        self.seed_unresolved(set);
        passes += self.fixpoint(set)?;
        self.top_down(set);
        Ok(passes)
    }

    fn fixpoint(&self, set: &mut EquationSet) -> Result<usize> {
        for iteration in 1..=self.config.max_iterations {
            let progress = self.pass(set)?;
            debug!(iteration, changed = progress.changed(), "exponent pass");
            if !progress.changed() {
                return Ok(iteration);
            }
        }
        analysis_err!(
            NotConverged,
            format!("exponents still changing after {} passes", self.config.max_iterations)
        )
    }

    fn pass(&self, set: &mut EquationSet) -> Result<Progress> {
        let mut progress = Progress::Stable;
        for id in set.ids() {
            let mut equations = mem::take(&mut set.get_mut(id).equations);
            let mut bottom_up = BottomUp {
                set: &*set,
                msb: self.config.msb,
                default_digits: self.config.default_digits,
                bounds: vec![],
                progress: Progress::Stable,
            };
            let outcome = bottom_up.equations(&mut equations);
            let BottomUp {
                bounds,
                progress: trees,
                ..
            } = bottom_up;
            progress |= trees;
            set.get_mut(id).equations = equations;
            outcome?;

            for (var, bound) in bounds {
                if set.get_mut(var).observe_bound(bound) {
                    trace!(variable = %set.get(var).full_name(), bound, "observed bound");
                    progress = Progress::Changed;
                }
            }
            progress |= self.update_variable(set, id);
        }
        Ok(progress)
    }

    /// Widen a variable to the largest of its equations and its bound.
    fn update_variable(&self, set: &mut EquationSet, id: VarId) -> Progress {
        let var = set.get(id);
        let current = if var.exponent == UNKNOWN {
            None
        } else {
            Some((var.exponent, var.center))
        };
        let roots: Option<Vec<(i32, i32)>> = var
            .equations
            .iter()
            .map(|eq| known(&eq.expression, eq.expression.root()))
            .collect();
        let candidate = roots
            .unwrap_or_default()
            .into_iter()
            .max_by_key(|&(e, c)| (e + c, c));

        let mut best = match (current, candidate) {
            (Some((e, c)), Some((ce, cc))) if ce + cc > e + c => Some((ce, cc)),
            (Some(current), _) => Some(current),
            (None, candidate) => candidate,
        };
        if let (Some((e, c)), Some(bound)) = (best, var.bound) {
            if bound > 0.0 && bound.is_finite() && magnitude_of(bound) > e + c {
                best = Some((magnitude_of(bound) - c, c));
            }
        }

        match best {
            Some((exponent, center)) if best != current => {
                let var = set.get_mut(id);
                var.exponent = exponent;
                var.center = center;
                Progress::Changed
            }
            _ => Progress::Stable,
        }
    }

    /// Give every variable still without an exponent a default one, sized
    /// by its bound when it has one.
    fn seed_unresolved(&self, set: &mut EquationSet) {
        let center = self.config.msb / 2;
        for id in set.ids() {
            let var = set.get_mut(id);
            if var.exponent != UNKNOWN {
                continue;
            }
            let magnitude = match var.bound {
                Some(bound) if bound > 0.0 && bound.is_finite() => magnitude_of(bound),
                _ => 0,
            };
            var.exponent = magnitude - center;
            var.center = center;
            trace!(variable = %var.full_name(), magnitude, "seeded exponent");
        }
    }

    fn top_down(&self, set: &mut EquationSet) {
        for id in set.ids() {
            let exponent = set.get(id).exponent;
            for equation in set.get_mut(id).equations.iter_mut() {
                if let Some(condition) = equation.condition.as_mut() {
                    let root = condition.root();
                    let own = condition.node(root).exponent;
                    propagate_exponents(condition, root, own);
                }
                let root = equation.expression.root();
                propagate_exponents(&mut equation.expression, root, exponent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::equations::Variable;
    use crate::op::ComparisonOp;
    use proptest::prelude::*;

    fn define(set: &mut EquationSet, id: VarId, tree: ExprTree) {
        set.get_mut(id).equations = vec![Equation::new(tree)];
    }

    fn root_of(set: &EquationSet, id: VarId) -> (ExprTree, NodeId) {
        let tree = set.get(id).equations[0].expression.clone();
        let root = tree.root();
        (tree, root)
    }

    fn analyze(set: &mut EquationSet) -> usize {
        ExponentAnalyzer::new(AnalysisConfig::default()).run(set).unwrap()
    }

    #[test]
    fn test_constant_exponents() {
        let set = EquationSet::new();
        let pass = BottomUp {
            set: &set,
            msb: 30,
            default_digits: 3,
            bounds: vec![],
            progress: Progress::Stable,
        };
        // 5 with 3 digits needs 10 bits, below half the mantissa
        assert_eq!((-13, 15), pass.constant(&Value::Scalar(5.0), None));
        assert_eq!((-13, 15), pass.constant(&Value::Scalar(-5.0), Some(1)));
        // 20 significant bits push the center up
        assert_eq!((1 - 19, 19), pass.constant(&Value::Scalar(3.14159), Some(6)));
        assert_eq!((0, 0), pass.constant(&Value::Scalar(0.0), None));
        assert_eq!((0, 0), pass.constant(&Value::from("label"), None));
    }

    #[test]
    fn test_addition_aligns_constant() {
        let mut set = EquationSet::new();
        let a = set.add_variable(Variable::new("a"));
        let b = set.add_variable(Variable::new("b"));
        define(&mut set, a, ExprTree::build(|t| t.constant_with_digits(3.0, 1)));
        define(
            &mut set,
            b,
            ExprTree::build(|t| {
                let ra = t.var(a, "a");
                let half = t.constant_with_digits(0.5, 1);
                t.binary(BinaryOp::Add, ra, half)
            }),
        );
        analyze(&mut set);

        assert_eq!((-14, 15), (set.get(a).exponent, set.get(a).center));
        assert_eq!((-14, 15), (set.get(b).exponent, set.get(b).center));
        let (tree, root) = root_of(&set, b);
        let half = tree.child(root, 1);
        // 0.5 moved two bits toward a without losing anything
        assert_eq!((-14, 13), (tree.node(half).exponent, tree.node(half).center));
        assert_eq!(Some(-1), tree.node(half).magnitude());
        assert_eq!(-14, tree.node(root).exponent_next);
        assert_eq!(-14, tree.node(half).exponent_next);
    }

    #[test]
    fn test_products_and_quotients() {
        let mut set = EquationSet::new();
        let a = set.add_variable(Variable::new("a"));
        let b = set.add_variable(Variable::new("b"));
        let c = set.add_variable(Variable::new("c"));
        define(&mut set, a, ExprTree::build(|t| t.constant(1000.0)));
        define(
            &mut set,
            b,
            ExprTree::build(|t| {
                let ra = t.var(a, "a");
                let rb = t.var(a, "a");
                t.binary(BinaryOp::Multiply, ra, rb)
            }),
        );
        define(
            &mut set,
            c,
            ExprTree::build(|t| {
                let one = t.constant(1.0);
                let ra = t.var(a, "a");
                t.binary(BinaryOp::Divide, one, ra)
            }),
        );
        analyze(&mut set);
        // 1000 is just under 2^10
        assert_eq!(9 - 15, set.get(a).exponent);
        assert_eq!(18, set.get(b).exponent + set.get(b).center);
        assert_eq!(-9, set.get(c).exponent + set.get(c).center);
    }

    #[test]
    fn test_bounds_from_comparisons() {
        let mut set = EquationSet::new();
        let x = set.add_variable(Variable::new("x"));
        let y = set.add_variable(Variable::new("y"));
        let z = set.add_variable(Variable::new("z"));
        define(
            &mut set,
            y,
            ExprTree::build(|t| {
                let rx = t.var(x, "x");
                let five = t.constant(5.0);
                t.comparison(ComparisonOp::Gt, rx, five)
            }),
        );
        define(
            &mut set,
            z,
            ExprTree::build(|t| {
                let rx = t.var(x, "x");
                let limit = t.constant(-20.0);
                t.comparison(ComparisonOp::Lt, rx, limit)
            }),
        );
        analyze(&mut set);
        assert_eq!(Some(20.0), set.get(x).bound);
        assert_eq!(4, set.get(x).exponent + set.get(x).center);
        assert_eq!((0, 0), (set.get(y).exponent, set.get(y).center));
    }

    #[test]
    fn test_comparison_meets_in_the_middle() {
        let mut set = EquationSet::new();
        let x = set.add_variable(Variable::new("x"));
        let y = set.add_variable(Variable::new("y"));
        define(&mut set, x, ExprTree::build(|t| t.constant_with_digits(1.0, 1)));
        define(
            &mut set,
            y,
            ExprTree::build(|t| {
                let rx = t.var(x, "x");
                let pi = t.constant_with_digits(3.14159, 6);
                t.comparison(ComparisonOp::Lt, rx, pi)
            }),
        );
        analyze(&mut set);
        // the bound lifts x to 2^1
        assert_eq!((-14, 15), (set.get(x).exponent, set.get(x).center));
        let (tree, root) = root_of(&set, y);
        let (rx, pi) = (tree.child(root, 0), tree.child(root, 1));
        // an odd mantissa can't be shifted up
        assert_eq!(-18, tree.node(pi).exponent);
        assert_eq!(-16, tree.node(rx).exponent_next);
        assert_eq!(-16, tree.node(pi).exponent_next);
    }

    #[test]
    fn test_odd_sum_leans_toward_variable() {
        let mut tree = ExprTree::build(|t| {
            let rx = t.var(VarId(0), "x");
            let c = t.constant(7.0);
            t.comparison(ComparisonOp::Le, rx, c)
        });
        let root = tree.root();
        let (rx, c) = (tree.child(root, 0), tree.child(root, 1));
        tree.node_mut(rx).exponent = -14;
        tree.node_mut(c).exponent = -17;
        propagate_exponents(&mut tree, root, 0);
        assert_eq!(-15, tree.node(c).exponent_next);

        tree.node_mut(rx).exponent = -17;
        tree.node_mut(c).exponent = -14;
        propagate_exponents(&mut tree, root, 0);
        assert_eq!(-16, tree.node(rx).exponent_next);
    }

    #[test]
    fn test_indices_are_integers() {
        let mut set = EquationSet::new();
        let table = set.add_variable(Variable::new("table").with_type(ValueKind::Matrix));
        let y = set.add_variable(Variable::new("y"));
        define(
            &mut set,
            y,
            ExprTree::build(|t| {
                let m = t.var(table, "table");
                let i = t.constant(2.0);
                t.element(m, &[i], Default::default())
            }),
        );
        analyze(&mut set);
        let (tree, root) = root_of(&set, y);
        assert_eq!(0, tree.node(tree.child(root, 1)).exponent_next);
        // unresolved inputs get a default of magnitude 0
        assert_eq!((-15, 15), (set.get(table).exponent, set.get(table).center));
        assert_eq!(-15, tree.node(root).exponent);
    }

    #[test]
    fn test_matrix_literal_skips_zeros() {
        let mut set = EquationSet::new();
        let m = set.add_variable(Variable::new("m"));
        define(
            &mut set,
            m,
            ExprTree::build(|t| {
                let elements = [0.0, 4.0, 0.0, 16.0].map(|v| t.constant(v));
                t.matrix(2, 2, &elements)
            }),
        );
        analyze(&mut set);
        // magnitudes 2 and 4 with center 15
        assert_eq!((-12, 15), (set.get(m).exponent, set.get(m).center));
    }

    #[test]
    fn test_nodes_resolve_once() {
        let mut set = EquationSet::new();
        let x = set.add_variable(Variable::new("x"));
        // x = x * x + 10
        define(
            &mut set,
            x,
            ExprTree::build(|t| {
                let a = t.var(x, "x");
                let b = t.var(x, "x");
                let square = t.binary(BinaryOp::Multiply, a, b);
                let ten = t.constant(10.0);
                t.binary(BinaryOp::Add, square, ten)
            }),
        );
        analyze(&mut set);
        assert_eq!(3, set.get(x).exponent + set.get(x).center);

        let (tree, root) = root_of(&set, x);
        let square = tree.child(root, 0);
        // the product was sized against the seeded x and kept
        assert_eq!(Some(0), tree.node(square).magnitude());
        // while the accesses follow x as it grows
        let access = tree.child(square, 0);
        assert_eq!((set.get(x).exponent, set.get(x).center), (tree.node(access).exponent, tree.node(access).center));
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let mut set = EquationSet::new();
        let x = set.add_variable(Variable::new("x"));
        define(&mut set, x, ExprTree::build(|t| t.constant(2.0)));
        let config = AnalysisConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let err = ExponentAnalyzer::new(config).run(&mut set).unwrap_err();
        assert_eq!(ErrorCode::NotConverged, err.code);
    }

    #[test]
    fn test_magnitude_out_of_range() {
        let mut set = EquationSet::new();
        let x = set.add_variable(Variable::new("x"));
        let y = set.add_variable(Variable::new("y"));
        define(&mut set, x, ExprTree::build(|t| t.constant(1e300)));
        define(
            &mut set,
            y,
            ExprTree::build(|t| {
                let rx = t.var(x, "x");
                let p = t.constant(1e6);
                t.binary(BinaryOp::Power, rx, p)
            }),
        );
        let err = ExponentAnalyzer::new(AnalysisConfig::default())
            .run(&mut set)
            .unwrap_err();
        assert_eq!(ErrorCode::ExponentOutOfRange, err.code);
    }

    #[test]
    fn test_rerun_is_stable() {
        let mut set = EquationSet::new();
        let a = set.add_variable(Variable::new("a"));
        let b = set.add_variable(Variable::new("b"));
        define(&mut set, a, ExprTree::build(|t| t.constant(12.5)));
        define(
            &mut set,
            b,
            ExprTree::build(|t| {
                let ra = t.var(a, "a");
                t.function(Builtin::Sqrt, &[ra])
            }),
        );
        analyze(&mut set);
        let before = (set.get(b).exponent, set.get(b).center);
        assert_eq!(2, analyze(&mut set));
        assert_eq!(before, (set.get(b).exponent, set.get(b).center));
    }

    proptest! {
        #[test]
        fn alignment_never_drops_bits(
            mantissa in 1u64..(1 << 20),
            scale in -20i32..20,
            center in 0i32..=30,
            target in -60i32..60,
        ) {
            let exponent = scale - center;
            let value = mantissa as f64 * 2f64.powi(exponent);
            let shift = alignment_shift(value, exponent, center, target, 30);
            let moved = exponent + shift;
            let kept = (value * 2f64.powi(-moved)).round() * 2f64.powi(moved);
            prop_assert_eq!(value, kept);
            prop_assert!((0..=30).contains(&(center - shift)));
            prop_assert!(shift == 0 || (shift > 0) == (target > exponent));
        }
    }
}
