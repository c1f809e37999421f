// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Constant folding and alias elimination.
//!
//! Trees are rewritten bottom-up.  A node whose operands are all constants
//! becomes a constant.  A variable access whose target is defined by a
//! single applicable equation is replaced by that equation's value when it
//! simplifies to a constant, or re-pointed at the aliased variable when it
//! simplifies to another variable access.  [`Simplifier::run`] repeats the
//! pass over an equation set until nothing changes.

use std::mem;

use tracing::{debug, trace};

use crate::analysis_err;
use crate::common::Result;
use crate::config::AnalysisConfig;
use crate::equations::{Attribute, Equation, EquationSet, VarId};
use crate::eval::{NoContext, eval, static_type};
use crate::op::{BinaryOp, ComparisonOp, ExprTree, LogicalOp, NodeId, OpKind, UnaryOp, VarRef};
use crate::progress::Progress;
use crate::render::render;
use crate::traverse::Transformer;
use crate::value::{Value, ValueKind};

/// What a variable access may be replaced with.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    Constant { value: Value, digits: Option<u32> },
    Alias(VarRef),
}

/// Simplify the defining expression of `target` on its own and report
/// what an access to it can become.  `chain` holds the variables whose
/// definitions are already being expanded; a target on the chain is left
/// alone.
pub fn resolve_access(set: &EquationSet, target: VarId, chain: &[VarId]) -> Result<Option<Resolved>> {
    if chain.contains(&target) {
        trace!(variable = %set.get(target).full_name(), "definition cycle, not expanding");
        return Ok(None);
    }
    let var = set.get(target);
    if var.has(Attribute::ExternalWrite) || var.order > 0 {
        return Ok(None);
    }
    // a variable with a derivative is integrated, its equation only
    // supplies the initial value
    if set.find(&format!("{}'", var.name)).is_some() {
        return Ok(None);
    }
    let expression = match var.equations.as_slice() {
        [eq] => match &eq.condition {
            None => &eq.expression,
            Some(condition) => match condition.constant_value(condition.root()) {
                Some(value) if value.is_true() => &eq.expression,
                _ => return Ok(None),
            },
        },
        _ => return Ok(None),
    };

    let mut copy = expression.deep_copy(expression.root());
    let mut chain = chain.to_vec();
    chain.push(target);
    simplify_tree(&mut copy, set, Some(target), &chain)?;

    let resolved = match copy.kind(copy.root()) {
        OpKind::Constant { value, digits } => Some(Resolved::Constant {
            value: value.clone(),
            digits: *digits,
        }),
        OpKind::Variable(var) => Some(Resolved::Alias(var.clone())),
        _ => None,
    };
    Ok(resolved)
}

struct Simplify<'a> {
    set: &'a EquationSet,
    owner: Option<VarId>,
    chain: &'a [VarId],
    progress: Progress,
}

impl Simplify<'_> {
    fn variable(&self, tree: &mut ExprTree, id: NodeId) -> Result<(Option<NodeId>, Progress)> {
        let Some(var) = tree.variable(id).cloned() else {
            return Ok((None, Progress::Stable));
        };
        match resolve_access(self.set, var.id, self.chain)? {
            Some(Resolved::Constant { value, digits }) => {
                let loc = tree.node(id).loc;
                let constant = tree.add(OpKind::Constant { value, digits }, &[], loc);
                Ok((Some(constant), Progress::Changed))
            }
            Some(Resolved::Alias(alias)) if self.may_alias(&var, &alias) => {
                tree.node_mut(id).kind = OpKind::Variable(alias);
                Ok((None, Progress::Changed))
            }
            _ => Ok((None, Progress::Stable)),
        }
    }

    fn may_alias(&self, target: &VarRef, alias: &VarRef) -> bool {
        if alias.id == target.id || Some(alias.id) == self.owner {
            return false;
        }
        let aliased = self.set.get(alias.id);
        if aliased.has(Attribute::Temporary) || aliased.has(Attribute::ExternalRead) {
            return false;
        }
        // an init-only value must not start tracking a live one
        !self.set.get(target.id).has(Attribute::InitOnly) || aliased.has(Attribute::InitOnly)
    }

    fn fold(&self, tree: &mut ExprTree, id: NodeId) -> Result<Option<NodeId>> {
        let children = tree.children(id);
        let foldable = match tree.kind(id) {
            OpKind::MatrixBuild { .. } => children.iter().all(|&c| tree.constant_scalar(c).is_some()),
            OpKind::Function(_)
            | OpKind::ElementAccess { .. }
            | OpKind::Unary(_)
            | OpKind::Binary(_)
            | OpKind::Comparison(_)
            | OpKind::Logical(_) => true,
            OpKind::Constant { .. } | OpKind::Variable(_) | OpKind::Split { .. } => false,
        };
        let constant_operands = children.iter().all(|&c| {
            tree.is_constant(c)
                && tree
                    .node(c)
                    .unit
                    .as_ref()
                    .is_none_or(|unit| unit.is_dimensionless())
        });
        if !foldable || !constant_operands {
            return Ok(None);
        }
        let digits = children
            .iter()
            .filter_map(|&c| match tree.kind(c) {
                OpKind::Constant { digits, .. } => *digits,
                _ => None,
            })
            .max();
        let value = eval(tree, id, &NoContext)?;
        let loc = tree.node(id).loc;
        Ok(Some(tree.add(OpKind::Constant { value, digits }, &[], loc)))
    }

    fn identity(&self, tree: &mut ExprTree, id: NodeId) -> Option<NodeId> {
        let children: Vec<NodeId> = tree.children(id).to_vec();
        let ty = |i: usize| static_type(tree, children[i], self.set);
        let is = |i: usize, v: f64| tree.constant_scalar(children[i]) == Some(v);
        let truth = |i: usize| tree.constant_scalar(children[i]).map(|v| v != 0.0);

        match tree.kind(id).clone() {
            OpKind::Binary(op) => {
                let numeric = |i: usize| ty(i) != ValueKind::Text;
                match op {
                    BinaryOp::Add if is(1, 0.0) && numeric(0) => Some(children[0]),
                    BinaryOp::Add if is(0, 0.0) && numeric(1) => Some(children[1]),
                    BinaryOp::Subtract if is(1, 0.0) && numeric(0) => Some(children[0]),
                    BinaryOp::Multiply | BinaryOp::MultiplyElementwise => {
                        if is(1, 1.0) && numeric(0) {
                            Some(children[0])
                        } else if is(0, 1.0) && numeric(1) {
                            Some(children[1])
                        } else if (is(1, 0.0) && ty(0) == ValueKind::Scalar)
                            || (is(0, 0.0) && ty(1) == ValueKind::Scalar)
                        {
                            Some(self.constant_like(tree, id, 0.0))
                        } else {
                            None
                        }
                    }
                    BinaryOp::Divide if is(1, 1.0) && numeric(0) => Some(children[0]),
                    BinaryOp::Power if is(1, 1.0) && numeric(0) => Some(children[0]),
                    BinaryOp::Power if is(1, 0.0) && ty(0) == ValueKind::Scalar => {
                        Some(self.constant_like(tree, id, 1.0))
                    }
                    _ => None,
                }
            }
            OpKind::Unary(UnaryOp::Negate) => match tree.kind(children[0]) {
                OpKind::Unary(UnaryOp::Negate) => Some(tree.child(children[0], 0)),
                _ => None,
            },
            OpKind::Logical(op) => {
                // index of the constant side, if any
                let (side, other) = match (truth(0), truth(1)) {
                    (Some(t), _) => (t, 1),
                    (None, Some(t)) => (t, 0),
                    (None, None) => return None,
                };
                if ty(other) != ValueKind::Scalar {
                    return None;
                }
                match (op, side) {
                    (LogicalOp::And, false) => Some(self.constant_like(tree, id, 0.0)),
                    (LogicalOp::Or, true) => Some(self.constant_like(tree, id, 1.0)),
                    _ => Some(children[other]),
                }
            }
            OpKind::Comparison(op) => {
                if ty(0) != ValueKind::Scalar || ty(1) != ValueKind::Scalar {
                    return None;
                }
                if render(tree, children[0]) != render(tree, children[1]) {
                    return None;
                }
                let same = matches!(op, ComparisonOp::Eq | ComparisonOp::Le | ComparisonOp::Ge);
                Some(self.constant_like(tree, id, same as i8 as f64))
            }
            _ => None,
        }
    }

    fn constant_like(&self, tree: &mut ExprTree, id: NodeId, value: f64) -> NodeId {
        let loc = tree.node(id).loc;
        tree.add(
            OpKind::Constant {
                value: Value::Scalar(value),
                digits: None,
            },
            &[],
            loc,
        )
    }
}

impl Transformer for Simplify<'_> {
    fn transform(&mut self, tree: &mut ExprTree, id: NodeId) -> Result<Option<NodeId>> {
        let is_access = match tree.kind(id) {
            OpKind::Constant { .. } | OpKind::Split { .. } => return Ok(None),
            OpKind::Variable(_) => true,
            _ => false,
        };
        let replacement = if is_access {
            let (replacement, progress) = self.variable(tree, id)?;
            self.progress |= progress;
            replacement
        } else {
            match self.fold(tree, id)? {
                Some(constant) => Some(constant),
                None => self.identity(tree, id),
            }
        };
        if replacement.is_some() {
            self.progress = Progress::Changed;
        }
        Ok(replacement)
    }
}

/// One bottom-up simplification pass over `tree`.  `owner` is the
/// variable the tree defines; `chain` lists the variables being expanded
/// by the caller.
pub fn simplify_tree(
    tree: &mut ExprTree,
    set: &EquationSet,
    owner: Option<VarId>,
    chain: &[VarId],
) -> Result<Progress> {
    let mut simplify = Simplify {
        set,
        owner,
        chain,
        progress: Progress::Stable,
    };
    tree.transform_post_order(&mut simplify)?;
    Ok(simplify.progress)
}

/// Simplify every equation of `owner`.  Conditions that are constant
/// true are dropped; equations whose condition is constant false are
/// removed.
pub fn simplify_equations(
    equations: &mut Vec<Equation>,
    set: &EquationSet,
    owner: VarId,
) -> Result<Progress> {
    let chain = [owner];
    let mut progress = Progress::Stable;
    let mut kept = Vec::with_capacity(equations.len());
    for mut equation in equations.drain(..) {
        progress |= simplify_tree(&mut equation.expression, set, Some(owner), &chain)?;
        if let Some(condition) = equation.condition.as_mut() {
            progress |= simplify_tree(condition, set, Some(owner), &chain)?;
            match condition.constant_value(condition.root()).map(Value::is_true) {
                Some(true) => {
                    equation.condition = None;
                    progress = Progress::Changed;
                }
                Some(false) => {
                    progress = Progress::Changed;
                    continue;
                }
                None => {}
            }
        }
        kept.push(equation);
    }
    *equations = kept;
    Ok(progress)
}

pub struct Simplifier;

impl Simplifier {
    /// Simplify every variable of `set` until a full pass changes nothing,
    /// then refresh dependencies.  Returns the number of passes made.
    pub fn run(set: &mut EquationSet, config: &AnalysisConfig) -> Result<usize> {
        for iteration in 1..=config.max_iterations {
            let mut progress = Progress::Stable;
            for id in set.ids() {
                let mut equations = mem::take(&mut set.get_mut(id).equations);
                let outcome = simplify_equations(&mut equations, set, id);
                set.get_mut(id).equations = equations;
                progress |= outcome?;
            }
            debug!(iteration, changed = progress.changed(), "simplify pass");
            if !progress.changed() {
                set.update_dependencies();
                return Ok(iteration);
            }
        }
        analysis_err!(
            NotConverged,
            format!("simplification still changing after {} passes", config.max_iterations)
        )
    }
}
