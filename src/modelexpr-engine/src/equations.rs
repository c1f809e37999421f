// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Variables and their equations: the context operator trees are resolved
//! against.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::common::canonicalize;
use crate::op::{ExprTree, UNKNOWN};
use crate::units::UnitMap;
use crate::value::ValueKind;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Value fixed for the whole run.
    Constant,
    /// Evaluated only during initialization.
    InitOnly,
    /// Written by code outside the owning equation set.
    ExternalWrite,
    /// Read by code outside the owning equation set.
    ExternalRead,
    /// Scratch value that is never stored.
    Temporary,
}

/// One defining equation: `expression` applies when `condition` holds, or
/// always if there is no condition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Equation {
    pub condition: Option<ExprTree>,
    pub expression: ExprTree,
}

impl Equation {
    pub fn new(expression: ExprTree) -> Self {
        Equation {
            condition: None,
            expression,
        }
    }

    pub fn conditional(condition: ExprTree, expression: ExprTree) -> Self {
        Equation {
            condition: Some(condition),
            expression,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Derivative order; `x''` has order 2.
    pub order: usize,
    pub equations: Vec<Equation>,
    pub attributes: BTreeSet<Attribute>,
    pub unit: Option<UnitMap>,
    pub ty: ValueKind,
    pub exponent: i32,
    pub center: i32,
    /// Largest magnitude this variable has been observed compared against.
    pub bound: Option<f64>,
    pub dependencies: BTreeSet<VarId>,
}

impl Variable {
    pub fn new(name: &str) -> Self {
        let name = canonicalize(name);
        let base = name.trim_end_matches('\'');
        let order = name.len() - base.len();
        Variable {
            name: base.to_owned(),
            order,
            equations: Vec::new(),
            attributes: BTreeSet::new(),
            unit: None,
            ty: ValueKind::Scalar,
            exponent: UNKNOWN,
            center: UNKNOWN,
            bound: None,
            dependencies: BTreeSet::new(),
        }
    }

    /// Name including one `'` per derivative order.
    pub fn full_name(&self) -> String {
        let mut name = self.name.clone();
        name.extend(std::iter::repeat_n('\'', self.order));
        name
    }

    pub fn has(&self, attribute: Attribute) -> bool {
        self.attributes.contains(&attribute)
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.insert(attribute);
        self
    }

    pub fn with_unit(mut self, unit: UnitMap) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_type(mut self, ty: ValueKind) -> Self {
        self.ty = ty;
        self
    }

    pub fn with_equation(mut self, equation: Equation) -> Self {
        self.equations.push(equation);
        self
    }

    pub fn with_bound(mut self, bound: f64) -> Self {
        self.bound = Some(bound.abs());
        self
    }

    /// Record `value` as an observed bound.  Returns true if it widened
    /// the previous bound.
    pub fn observe_bound(&mut self, value: f64) -> bool {
        let value = value.abs();
        if !value.is_finite() {
            return false;
        }
        match self.bound {
            Some(bound) if bound >= value => false,
            _ => {
                self.bound = Some(value);
                true
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EquationSet {
    variables: Vec<Variable>,
    by_name: HashMap<String, VarId>,
}

impl EquationSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a variable, replacing any existing one with the same full name.
    pub fn add_variable(&mut self, variable: Variable) -> VarId {
        let full_name = variable.full_name();
        if let Some(&id) = self.by_name.get(&full_name) {
            self.variables[id.0] = variable;
            return id;
        }
        let id = VarId(self.variables.len());
        self.variables.push(variable);
        self.by_name.insert(full_name, id);
        id
    }

    /// Look up a variable by name; trailing `'` select the derivative order.
    pub fn find(&self, name: &str) -> Option<VarId> {
        self.by_name.get(&canonicalize(name)).copied()
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.0]
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = VarId> + use<> {
        (0..self.variables.len()).map(VarId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables.iter().enumerate().map(|(i, v)| (VarId(i), v))
    }

    /// Recompute every variable's dependencies from the variables its
    /// equations and conditions reference.
    pub fn update_dependencies(&mut self) {
        for variable in self.variables.iter_mut() {
            let mut dependencies = BTreeSet::new();
            for equation in variable.equations.iter() {
                let trees = std::iter::once(&equation.expression).chain(equation.condition.iter());
                for tree in trees {
                    dependencies.extend(tree.variables(tree.root()).into_iter().map(|v| v.id));
                }
            }
            variable.dependencies = dependencies;
        }
    }

    /// Variables whose equations reference `id`.
    pub fn dependents(&self, id: VarId) -> Vec<VarId> {
        self.iter()
            .filter(|(_, v)| v.dependencies.contains(&id))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::BinaryOp;

    #[test]
    fn test_names_and_orders() {
        let mut set = EquationSet::new();
        let x = set.add_variable(Variable::new("x"));
        let dx = set.add_variable(Variable::new("x'"));
        let spaced = set.add_variable(Variable::new(" growth rate "));
        assert_ne!(x, dx);
        assert_eq!(1, set.get(dx).order);
        assert_eq!("x", set.get(dx).name);
        assert_eq!("x'", set.get(dx).full_name());
        assert_eq!(Some(dx), set.find("x'"));
        assert_eq!(Some(spaced), set.find("growth rate"));
        assert_eq!(None, set.find("y"));

        let again = set.add_variable(Variable::new("x").with_attribute(Attribute::Constant));
        assert_eq!(x, again);
        assert_eq!(3, set.len());
        assert!(set.get(x).has(Attribute::Constant));
    }

    #[test]
    fn test_dependencies() {
        let mut set = EquationSet::new();
        let a = set.add_variable(Variable::new("a"));
        let b = set.add_variable(Variable::new("b"));
        let c = set.add_variable(Variable::new("c"));
        let expression = ExprTree::build(|t| {
            let ra = t.var(a, "a");
            let rb = t.var(b, "b");
            t.binary(BinaryOp::Add, ra, rb)
        });
        let condition = ExprTree::build(|t| t.var(c, "c"));
        set.get_mut(c)
            .equations
            .push(Equation::conditional(condition, expression));
        set.update_dependencies();
        assert_eq!(
            vec![a, b, c],
            set.get(c).dependencies.iter().copied().collect::<Vec<_>>()
        );
        assert_eq!(vec![c], set.dependents(a));
        assert!(set.dependents(c).contains(&c));
        assert!(set.get(a).dependencies.is_empty());
    }

    #[test]
    fn test_observe_bound() {
        let mut v = Variable::new("x");
        assert!(v.observe_bound(5.0));
        assert!(v.observe_bound(-20.0));
        assert!(!v.observe_bound(7.0));
        assert!(!v.observe_bound(f64::INFINITY));
        assert_eq!(Some(20.0), v.bound);
    }
}
