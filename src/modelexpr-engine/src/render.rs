// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Infix rendering of operator trees.
//!
//! Parentheses appear only where precedence or associativity demand them:
//! a child is wrapped if it binds more loosely than its parent, or equally
//! loosely while sitting on the side the parent does not associate toward.

use crate::op::{
    ATOM_PRECEDENCE, Associativity, BinaryOp, ComparisonOp, ExprTree, LogicalOp, NodeId, OpKind,
    UnaryOp,
};
use crate::traverse::Renderer;
use crate::value::Value;

/// Renderer that never intercepts.
pub struct Infix;

impl Renderer for Infix {
    fn render(&mut self, _tree: &ExprTree, _id: NodeId, _out: &mut String) -> bool {
        false
    }
}

pub fn render(tree: &ExprTree, id: NodeId) -> String {
    render_with(tree, id, &mut Infix)
}

pub fn render_tree(tree: &ExprTree) -> String {
    render(tree, tree.root())
}

pub fn render_with(tree: &ExprTree, id: NodeId, renderer: &mut dyn Renderer) -> String {
    let mut out = String::new();
    write_node(tree, id, renderer, &mut out);
    out
}

pub fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::MultiplyElementwise => "&",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Power => "^",
    }
}

pub fn comparison_symbol(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Lt => "<",
        ComparisonOp::Le => "<=",
        ComparisonOp::Gt => ">",
        ComparisonOp::Ge => ">=",
        ComparisonOp::Eq => "==",
        ComparisonOp::Ne => "!=",
    }
}

pub fn logical_symbol(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "&&",
        LogicalOp::Or => "||",
    }
}

pub fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Negate => "-",
        UnaryOp::Not => "!",
        UnaryOp::Transpose => "~",
    }
}

/// Precedence of a node as written.  A negative literal reads like a
/// prefix negation.
fn precedence(tree: &ExprTree, id: NodeId) -> u8 {
    match tree.kind(id) {
        OpKind::Constant {
            value: Value::Scalar(v),
            ..
        } if v.is_sign_negative() => OpKind::Unary(UnaryOp::Negate).precedence(),
        kind => kind.precedence(),
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn needs_parens(tree: &ExprTree, parent: NodeId, child: NodeId, side: Side) -> bool {
    let kind = tree.kind(parent);
    let p = precedence(tree, parent);
    let c = precedence(tree, child);
    if c < p {
        return true;
    }
    if c > p || c == ATOM_PRECEDENCE {
        return false;
    }
    match kind.associativity() {
        Associativity::Left => side == Side::Right,
        Associativity::Right => side == Side::Left,
    }
}

fn write_operand(
    tree: &ExprTree,
    parent: NodeId,
    child: NodeId,
    side: Side,
    renderer: &mut dyn Renderer,
    out: &mut String,
) {
    if needs_parens(tree, parent, child, side) {
        out.push('(');
        write_node(tree, child, renderer, out);
        out.push(')');
    } else {
        write_node(tree, child, renderer, out);
    }
}

fn write_list(tree: &ExprTree, ids: &[NodeId], renderer: &mut dyn Renderer, out: &mut String) {
    for (i, &id) in ids.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_node(tree, id, renderer, out);
    }
}

fn write_node(tree: &ExprTree, id: NodeId, renderer: &mut dyn Renderer, out: &mut String) {
    if renderer.render(tree, id, out) {
        return;
    }
    let children = tree.children(id);
    match tree.kind(id) {
        OpKind::Constant { value, .. } => match value {
            Value::Text(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            _ => out.push_str(&value.to_string()),
        },
        OpKind::Variable(v) => out.push_str(&v.name),
        OpKind::ElementAccess { .. } => {
            write_operand(tree, id, children[0], Side::Left, renderer, out);
            out.push('(');
            write_list(tree, &children[1..], renderer, out);
            out.push(')');
        }
        OpKind::Unary(op) => {
            out.push_str(unary_symbol(*op));
            write_operand(tree, id, children[0], Side::Right, renderer, out);
        }
        OpKind::Binary(op) => {
            write_operand(tree, id, children[0], Side::Left, renderer, out);
            if *op == BinaryOp::Power {
                out.push('^');
            } else {
                out.push(' ');
                out.push_str(binary_symbol(*op));
                out.push(' ');
            }
            write_operand(tree, id, children[1], Side::Right, renderer, out);
        }
        OpKind::Comparison(op) => {
            write_operand(tree, id, children[0], Side::Left, renderer, out);
            out.push(' ');
            out.push_str(comparison_symbol(*op));
            out.push(' ');
            write_operand(tree, id, children[1], Side::Right, renderer, out);
        }
        OpKind::Logical(op) => {
            write_operand(tree, id, children[0], Side::Left, renderer, out);
            out.push(' ');
            out.push_str(logical_symbol(*op));
            out.push(' ');
            write_operand(tree, id, children[1], Side::Right, renderer, out);
        }
        OpKind::MatrixBuild { rows, columns } => {
            out.push('[');
            for r in 0..*rows {
                if r > 0 {
                    out.push(';');
                }
                for c in 0..*columns {
                    if c > 0 {
                        out.push(',');
                    }
                    write_node(tree, children[r * columns + c], renderer, out);
                }
            }
            out.push(']');
        }
        OpKind::Split { parts } => {
            out.push_str("split(");
            out.push_str(&parts.join(", "));
            out.push(')');
        }
        OpKind::Function(builtin) => {
            out.push_str(builtin.name());
            out.push('(');
            write_list(tree, children, renderer, out);
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::VarId;
    use crate::op::Builtin;

    fn var(t: &mut ExprTree, name: &str) -> NodeId {
        t.var(VarId(0), name)
    }

    #[test]
    fn test_parenthesization() {
        // (a + b) * c
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let b = var(t, "b");
            let sum = t.binary(BinaryOp::Add, a, b);
            let c = var(t, "c");
            t.binary(BinaryOp::Multiply, sum, c)
        });
        assert_eq!("(a + b) * c", render_tree(&tree));

        // a - (b - c) keeps its parens, (a - b) - c does not need any
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let b = var(t, "b");
            let c = var(t, "c");
            let inner = t.binary(BinaryOp::Subtract, b, c);
            t.binary(BinaryOp::Subtract, a, inner)
        });
        assert_eq!("a - (b - c)", render_tree(&tree));
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let b = var(t, "b");
            let c = var(t, "c");
            let inner = t.binary(BinaryOp::Subtract, a, b);
            t.binary(BinaryOp::Subtract, inner, c)
        });
        assert_eq!("a - b - c", render_tree(&tree));
    }

    #[test]
    fn test_power_is_right_associative() {
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let b = var(t, "b");
            let c = var(t, "c");
            let inner = t.binary(BinaryOp::Power, b, c);
            t.binary(BinaryOp::Power, a, inner)
        });
        assert_eq!("a^b^c", render_tree(&tree));
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let b = var(t, "b");
            let c = var(t, "c");
            let inner = t.binary(BinaryOp::Power, a, b);
            t.binary(BinaryOp::Power, inner, c)
        });
        assert_eq!("(a^b)^c", render_tree(&tree));
        // -a^2 is -(a^2); (-a)^2 needs parens
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let neg = t.unary(UnaryOp::Negate, a);
            let two = t.constant(2.0);
            t.binary(BinaryOp::Power, neg, two)
        });
        assert_eq!("(-a)^2", render_tree(&tree));
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let minus = t.constant(-3.0);
            t.binary(BinaryOp::Power, a, minus)
        });
        assert_eq!("a^(-3)", render_tree(&tree));
    }

    #[test]
    fn test_other_forms() {
        let tree = ExprTree::build(|t| {
            let m = var(t, "m");
            let i = t.constant(1.0);
            let j = t.constant(0.0);
            let access = t.element(m, &[i, j], Default::default());
            let one = t.constant(1.0);
            let two = t.constant(2.0);
            let lit = t.matrix(1, 2, &[one, two]);
            let norm = t.function(Builtin::Norm, &[lit]);
            let cmp = t.comparison(ComparisonOp::Le, access, norm);
            let s = t.constant("s");
            let r = t.constant("r");
            let eq = t.comparison(ComparisonOp::Ne, s, r);
            t.logical(LogicalOp::And, cmp, eq)
        });
        assert_eq!(
            "m(1, 0) <= norm([1,2]) && \"s\" != \"r\"",
            render_tree(&tree)
        );
    }

    #[test]
    fn test_text_is_escaped() {
        let tree = ExprTree::build(|t| t.constant("say \"hi\" \\ bye"));
        assert_eq!(r#""say \"hi\" \\ bye""#, render_tree(&tree));
    }

    struct Upper;

    impl Renderer for Upper {
        fn render(&mut self, tree: &ExprTree, id: NodeId, out: &mut String) -> bool {
            match tree.variable(id) {
                Some(v) => {
                    out.push_str(&v.name.to_uppercase());
                    true
                }
                None => false,
            }
        }
    }

    #[test]
    fn test_renderer_intercepts() {
        let tree = ExprTree::build(|t| {
            let a = var(t, "a");
            let n = t.unary(UnaryOp::Not, a);
            let b = var(t, "b");
            t.logical(LogicalOp::Or, n, b)
        });
        assert_eq!("!A || B", render_with(&tree, tree.root(), &mut Upper));
    }
}
