// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Operator trees.
//!
//! Nodes live in a slot-map arena owned by [`ExprTree`] and refer to each
//! other by [`NodeId`].  Children are owned by their parent; the `parent`
//! field is bookkeeping for rewrites and is never followed during
//! evaluation.  A node has exactly one parent, so a subtree must be copied
//! with [`ExprTree::copy_subtree`] or [`ExprTree::graft`] before it is
//! reused somewhere else.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::common::Loc;
use crate::equations::VarId;
use crate::linear::Sampling;
use crate::units::UnitMap;
use crate::value::{Value, ValueKind};

slotmap::new_key_type! {
    pub struct NodeId;
}

/// Exponent or center that has not been resolved yet.
pub const UNKNOWN: i32 = i32::MIN;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    Transpose,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    /// Matrix product when both operands are matrices.
    Multiply,
    MultiplyElementwise,
    Divide,
    Modulo,
    Power,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Abs,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Norm,
    Det,
    Sum,
    Rows,
    Cols,
}

impl Builtin {
    pub const ALL: [Builtin; 17] = [
        Builtin::Abs,
        Builtin::Sqrt,
        Builtin::Exp,
        Builtin::Log,
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Floor,
        Builtin::Ceil,
        Builtin::Round,
        Builtin::Min,
        Builtin::Max,
        Builtin::Norm,
        Builtin::Det,
        Builtin::Sum,
        Builtin::Rows,
        Builtin::Cols,
    ];

    pub fn name(self) -> &'static str {
        use Builtin::*;
        match self {
            Abs => "abs",
            Sqrt => "sqrt",
            Exp => "exp",
            Log => "log",
            Sin => "sin",
            Cos => "cos",
            Tan => "tan",
            Floor => "floor",
            Ceil => "ceil",
            Round => "round",
            Min => "min",
            Max => "max",
            Norm => "norm",
            Det => "det",
            Sum => "sum",
            Rows => "rows",
            Cols => "cols",
        }
    }

    /// Inclusive bounds on the number of arguments.
    pub fn arity(self) -> (usize, usize) {
        use Builtin::*;
        match self {
            Min | Max => (1, usize::MAX),
            Norm => (1, 2),
            _ => (1, 1),
        }
    }
}

/// Reference from an access node to a variable in the equation set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub id: VarId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    /// A literal.  `digits` is the count of significant digits written in
    /// the source, when known.
    Constant { value: Value, digits: Option<u32> },
    Variable(VarRef),
    /// Element read: children[0] is the matrix, the rest are indices.
    ElementAccess { sampling: Sampling },
    Unary(UnaryOp),
    Binary(BinaryOp),
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    /// Literal matrix; children are its elements in row-major order.
    MatrixBuild { rows: usize, columns: usize },
    /// Reference to the population types an instance may split into.
    /// Only meaningful to code generators.
    Split { parts: Vec<String> },
    Function(Builtin),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// Precedence of anything that never needs parentheses.
pub const ATOM_PRECEDENCE: u8 = 8;

impl OpKind {
    /// Binding strength; larger binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            OpKind::Logical(LogicalOp::Or) => 1,
            OpKind::Logical(LogicalOp::And) => 2,
            OpKind::Comparison(_) => 3,
            OpKind::Binary(BinaryOp::Add | BinaryOp::Subtract) => 4,
            OpKind::Binary(BinaryOp::Power) => 7,
            OpKind::Binary(_) => 5,
            OpKind::Unary(_) => 6,
            _ => ATOM_PRECEDENCE,
        }
    }

    pub fn associativity(&self) -> Associativity {
        match self {
            OpKind::Binary(BinaryOp::Power) | OpKind::Unary(_) => Associativity::Right,
            _ => Associativity::Left,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, OpKind::Constant { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: OpKind,
    pub children: SmallVec<[NodeId; 2]>,
    pub parent: Option<NodeId>,
    pub loc: Loc,
    pub unit: Option<UnitMap>,
    pub ty: Option<ValueKind>,
    /// Power-of-two weight of the least significant mantissa bit.
    pub exponent: i32,
    /// Index of the most significant live mantissa bit.
    pub center: i32,
    /// Exponent requested by the consumer of this node.
    pub exponent_next: i32,
}

impl Node {
    pub fn new(kind: OpKind, loc: Loc) -> Self {
        Node {
            kind,
            children: SmallVec::new(),
            parent: None,
            loc,
            unit: None,
            ty: None,
            exponent: UNKNOWN,
            center: UNKNOWN,
            exponent_next: UNKNOWN,
        }
    }

    /// Power of two of the most significant live bit.
    pub fn magnitude(&self) -> Option<i32> {
        if self.exponent == UNKNOWN {
            None
        } else {
            Some(self.exponent + self.center)
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExprTree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl Default for ExprTree {
    /// A tree holding the constant 0.
    fn default() -> Self {
        ExprTree::build(|t| t.constant(0.0))
    }
}

impl PartialEq for ExprTree {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: &ExprTree, ia: NodeId, b: &ExprTree, ib: NodeId) -> bool {
            let (na, nb) = (a.node(ia), b.node(ib));
            na.kind == nb.kind
                && na.children.len() == nb.children.len()
                && na
                    .children
                    .iter()
                    .zip(nb.children.iter())
                    .all(|(&ca, &cb)| same(a, ca, b, cb))
        }
        same(self, self.root, other, other.root)
    }
}

impl ExprTree {
    /// Build a tree; `f` adds nodes and returns the root.
    pub fn build(f: impl FnOnce(&mut ExprTree) -> NodeId) -> ExprTree {
        let mut tree = ExprTree {
            nodes: SlotMap::with_key(),
            root: NodeId::default(),
        };
        tree.root = f(&mut tree);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.nodes[id].parent = None;
        self.root = id;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &OpKind {
        &self.nodes[id].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn child(&self, id: NodeId, index: usize) -> NodeId {
        self.nodes[id].children[index]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn constant_value(&self, id: NodeId) -> Option<&Value> {
        match &self.nodes[id].kind {
            OpKind::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn constant_scalar(&self, id: NodeId) -> Option<f64> {
        self.constant_value(id).and_then(Value::as_scalar)
    }

    pub fn is_constant(&self, id: NodeId) -> bool {
        self.nodes[id].kind.is_constant()
    }

    pub fn variable(&self, id: NodeId) -> Option<&VarRef> {
        match &self.nodes[id].kind {
            OpKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Add a detached node taking ownership of `children`.
    pub fn add(&mut self, kind: OpKind, children: &[NodeId], loc: Loc) -> NodeId {
        let mut node = Node::new(kind, loc);
        node.children.extend_from_slice(children);
        let id = self.nodes.insert(node);
        for &child in children {
            self.nodes[child].parent = Some(id);
        }
        id
    }

    pub fn constant(&mut self, value: impl Into<Value>) -> NodeId {
        self.add(
            OpKind::Constant {
                value: value.into(),
                digits: None,
            },
            &[],
            Loc::default(),
        )
    }

    pub fn constant_with_digits(&mut self, value: impl Into<Value>, digits: u32) -> NodeId {
        self.add(
            OpKind::Constant {
                value: value.into(),
                digits: Some(digits),
            },
            &[],
            Loc::default(),
        )
    }

    pub fn var(&mut self, id: VarId, name: &str) -> NodeId {
        self.add(
            OpKind::Variable(VarRef {
                id,
                name: name.to_owned(),
            }),
            &[],
            Loc::default(),
        )
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
        self.add(OpKind::Unary(op), &[operand], Loc::default())
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.add(OpKind::Binary(op), &[left, right], Loc::default())
    }

    pub fn comparison(&mut self, op: ComparisonOp, left: NodeId, right: NodeId) -> NodeId {
        self.add(OpKind::Comparison(op), &[left, right], Loc::default())
    }

    pub fn logical(&mut self, op: LogicalOp, left: NodeId, right: NodeId) -> NodeId {
        self.add(OpKind::Logical(op), &[left, right], Loc::default())
    }

    pub fn function(&mut self, builtin: Builtin, args: &[NodeId]) -> NodeId {
        self.add(OpKind::Function(builtin), args, Loc::default())
    }

    /// Element access on `target`; the index list may be empty.
    pub fn element(&mut self, target: NodeId, indices: &[NodeId], sampling: Sampling) -> NodeId {
        let mut children: SmallVec<[NodeId; 4]> = SmallVec::new();
        children.push(target);
        children.extend_from_slice(indices);
        self.add(OpKind::ElementAccess { sampling }, &children, Loc::default())
    }

    /// Matrix literal from row-major elements.
    pub fn matrix(&mut self, rows: usize, columns: usize, elements: &[NodeId]) -> NodeId {
        debug_assert_eq!(rows * columns, elements.len());
        self.add(OpKind::MatrixBuild { rows, columns }, elements, Loc::default())
    }

    /// Put `new` in the child slot `index` of `parent` and delete the
    /// subtree that was there, unless `new` came from inside it.
    pub fn replace_child(&mut self, parent: NodeId, index: usize, new: NodeId) {
        let old = self.nodes[parent].children[index];
        if old == new {
            return;
        }
        self.nodes[parent].children[index] = new;
        self.nodes[new].parent = Some(parent);
        self.remove_subtree(old, Some(new));
    }

    /// Substitute `new` for `old` wherever `old` hangs in the tree.  `new`
    /// must be detached or a descendant of `old`.  The rest of `old`'s
    /// subtree is removed from the arena.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        match self.nodes[old].parent {
            Some(parent) => {
                let index = self.nodes[parent]
                    .children
                    .iter()
                    .position(|&c| c == old);
                if let Some(index) = index {
                    self.replace_child(parent, index, new);
                }
            }
            None => {
                if self.root == old {
                    self.root = new;
                }
                self.nodes[new].parent = None;
                self.remove_subtree(old, Some(new));
            }
        }
    }

    /// Delete `id` and its descendants, sparing `keep` and everything
    /// below it.
    pub fn remove_subtree(&mut self, id: NodeId, keep: Option<NodeId>) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if Some(id) == keep {
                continue;
            }
            if let Some(node) = self.nodes.remove(id) {
                pending.extend(node.children);
            }
        }
    }

    /// Copy the subtree at `id` within this tree.  The copy is detached.
    pub fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let originals: SmallVec<[NodeId; 4]> = self.nodes[id].children.iter().copied().collect();
        let children: SmallVec<[NodeId; 2]> = originals
            .into_iter()
            .map(|child| self.copy_subtree(child))
            .collect();
        let mut node = self.nodes[id].clone();
        node.children = children.clone();
        node.parent = None;
        let new = self.nodes.insert(node);
        for child in children {
            self.nodes[child].parent = Some(new);
        }
        new
    }

    /// Copy the subtree at `id` of `other` into this tree.  The copy is
    /// detached and keeps all node annotations.
    pub fn graft(&mut self, other: &ExprTree, id: NodeId) -> NodeId {
        let source = other.node(id);
        let children: SmallVec<[NodeId; 4]> = source
            .children
            .iter()
            .map(|&child| self.graft(other, child))
            .collect();
        let mut node = source.clone();
        node.children = children.iter().copied().collect();
        node.parent = None;
        let new = self.nodes.insert(node);
        for &child in children.iter() {
            self.nodes[child].parent = Some(new);
        }
        new
    }

    /// A standalone tree holding a copy of the subtree at `id`.
    pub fn deep_copy(&self, id: NodeId) -> ExprTree {
        ExprTree::build(|t| t.graft(self, id))
    }

    /// Node ids below and including `id`, parents before children.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            result.push(id);
            pending.extend(self.nodes[id].children.iter().rev().copied());
        }
        result
    }

    /// Every variable referenced below `id`.
    pub fn variables(&self, id: NodeId) -> Vec<VarRef> {
        self.preorder(id)
            .into_iter()
            .filter_map(|n| self.variable(n).cloned())
            .collect()
    }

    /// Check that every child points back at its parent and that the
    /// arena holds nothing unreachable from the root.
    pub fn is_consistent(&self) -> bool {
        if self.nodes[self.root].parent.is_some() {
            return false;
        }
        let reachable = self.preorder(self.root);
        reachable.len() == self.nodes.len()
            && reachable.iter().all(|&id| {
                self.nodes[id]
                    .children
                    .iter()
                    .all(|&c| self.nodes[c].parent == Some(id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (ExprTree, NodeId, NodeId) {
        let mut x = NodeId::default();
        let mut product = NodeId::default();
        let tree = ExprTree::build(|t| {
            x = t.var(VarId(0), "x");
            let three = t.constant(3.0);
            product = t.binary(BinaryOp::Multiply, x, three);
            let one = t.constant(1.0);
            t.binary(BinaryOp::Add, product, one)
        });
        (tree, x, product)
    }

    #[test]
    fn test_parent_links() {
        let (tree, x, product) = sample_tree();
        assert_eq!(5, tree.len());
        assert_eq!(Some(product), tree.parent(x));
        assert_eq!(Some(tree.root()), tree.parent(product));
        assert_eq!(None, tree.parent(tree.root()));
        assert!(tree.is_consistent());
        assert_eq!(vec!["x".to_owned()], tree.variables(tree.root()).into_iter().map(|v| v.name).collect::<Vec<_>>());
    }

    #[test]
    fn test_replace_with_descendant() {
        let (mut tree, x, product) = sample_tree();
        // (x * 3) + 1  ->  x + 1
        tree.replace(product, x);
        assert_eq!(3, tree.len());
        assert!(!tree.contains(product));
        assert_eq!(tree.child(tree.root(), 0), x);
        assert_eq!(Some(tree.root()), tree.parent(x));
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_replace_root() {
        let (mut tree, x, _) = sample_tree();
        let root = tree.root();
        tree.replace(root, x);
        assert_eq!(x, tree.root());
        assert_eq!(1, tree.len());
        assert!(tree.is_consistent());

        let fresh = tree.constant(9.0);
        tree.replace(x, fresh);
        assert_eq!(Some(9.0), tree.constant_scalar(tree.root()));
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_copies_are_detached() {
        let (mut tree, _, product) = sample_tree();
        let copy = tree.copy_subtree(product);
        assert_eq!(None, tree.parent(copy));
        assert_eq!(8, tree.len());
        let root = tree.root();
        tree.replace_child(root, 1, copy);
        assert_eq!(7, tree.len());
        assert!(tree.is_consistent());

        let standalone = tree.deep_copy(product);
        assert_eq!(3, standalone.len());
        assert!(standalone.is_consistent());
        assert_eq!(standalone, tree.deep_copy(copy));
    }

    #[test]
    fn test_precedence_table() {
        let add = OpKind::Binary(BinaryOp::Add);
        let mul = OpKind::Binary(BinaryOp::Multiply);
        let pow = OpKind::Binary(BinaryOp::Power);
        assert!(mul.precedence() > add.precedence());
        assert!(pow.precedence() > OpKind::Unary(UnaryOp::Negate).precedence());
        assert!(add.precedence() > OpKind::Comparison(ComparisonOp::Lt).precedence());
        assert_eq!(Associativity::Right, pow.associativity());
        assert_eq!(Associativity::Left, add.associativity());
        assert_eq!(ATOM_PRECEDENCE, OpKind::Function(Builtin::Abs).precedence());
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<&str> = Builtin::ALL.iter().map(|b| b.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(Builtin::ALL.len(), names.len());
        assert_eq!((1, 2), Builtin::Norm.arity());
    }
}
