// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Building operator trees from parsed syntax.
//!
//! The parser hands over [`Syntax`] nodes with column spans into the
//! equation's source line.  A [`Registry`] maps call names to builtins and
//! is passed explicitly to whoever builds trees, so independent pipelines
//! can carry different function sets.

use std::collections::HashMap;

use crate::common::{Loc, ParseError, ParseResult, canonicalize};
use crate::equations::EquationSet;
use crate::linear::Sampling;
use crate::op::{BinaryOp, Builtin, ComparisonOp, ExprTree, LogicalOp, NodeId, OpKind, UnaryOp, VarRef};
use crate::parse_err;
use crate::units::UnitMap;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InfixOp {
    Arith(BinaryOp),
    Compare(ComparisonOp),
    Logic(LogicalOp),
}

/// Untyped syntax as produced by the parser.
#[derive(Clone, Debug, PartialEq)]
pub enum Syntax {
    /// Numeric literal as written, with an optional unit annotation.
    Number {
        text: String,
        unit: Option<String>,
        loc: Loc,
    },
    Text {
        value: String,
        loc: Loc,
    },
    Ident {
        name: String,
        loc: Loc,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Syntax>,
        loc: Loc,
    },
    Binary {
        op: InfixOp,
        left: Box<Syntax>,
        right: Box<Syntax>,
        loc: Loc,
    },
    /// `name(args)`: a builtin call, or element access when `name` is a
    /// variable.
    Call {
        name: String,
        args: Vec<Syntax>,
        loc: Loc,
    },
    Matrix {
        rows: Vec<Vec<Syntax>>,
        loc: Loc,
    },
    Split {
        parts: Vec<String>,
        loc: Loc,
    },
}

impl Syntax {
    pub fn loc(&self) -> Loc {
        match self {
            Syntax::Number { loc, .. }
            | Syntax::Text { loc, .. }
            | Syntax::Ident { loc, .. }
            | Syntax::Unary { loc, .. }
            | Syntax::Binary { loc, .. }
            | Syntax::Call { loc, .. }
            | Syntax::Matrix { loc, .. }
            | Syntax::Split { loc, .. } => *loc,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Entry {
    Builtin(Builtin),
    /// Known to the modeling language but not supported by this core.
    Unsupported,
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    functions: HashMap<String, Entry>,
}

impl Registry {
    /// A registry without any functions.
    pub fn new() -> Self {
        Default::default()
    }

    /// Every builtin under its own name, `ln` as an alias for `log`, and
    /// the functions that need a simulation runtime marked unsupported.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        for builtin in Builtin::ALL {
            registry.register(builtin.name(), builtin);
        }
        registry.register("ln", Builtin::Log);
        for name in ["event", "delay", "input", "output"] {
            registry.mark_unsupported(name);
        }
        registry
    }

    pub fn register(&mut self, name: &str, builtin: Builtin) {
        self.functions
            .insert(canonicalize(name), Entry::Builtin(builtin));
    }

    pub fn mark_unsupported(&mut self, name: &str) {
        self.functions.insert(canonicalize(name), Entry::Unsupported);
    }

    pub fn lookup(&self, name: &str) -> Option<Builtin> {
        match self.functions.get(&canonicalize(name)) {
            Some(Entry::Builtin(builtin)) => Some(*builtin),
            _ => None,
        }
    }

    /// Build the operator tree for `syntax`, resolving identifiers against
    /// `set`.  `line` is the source text the syntax spans point into.
    pub fn build(&self, syntax: &Syntax, set: &EquationSet, line: &str) -> ParseResult<ExprTree> {
        let mut tree = ExprTree::default();
        let root = self.lower(&mut tree, syntax, set, line)?;
        let placeholder = tree.root();
        tree.set_root(root);
        tree.remove_subtree(placeholder, None);
        Ok(tree)
    }

    fn lower(
        &self,
        tree: &mut ExprTree,
        syntax: &Syntax,
        set: &EquationSet,
        line: &str,
    ) -> ParseResult<NodeId> {
        let id = match syntax {
            Syntax::Number { text, unit, loc } => {
                let value: f64 = match text.trim().parse() {
                    Ok(value) => value,
                    Err(_) => {
                        return parse_err!(line, *loc, ExpectedNumber, format!("'{text}'"));
                    }
                };
                let digits = significant_digits(text);
                let id = tree.add(
                    OpKind::Constant {
                        value: Value::Scalar(value),
                        digits: Some(digits),
                    },
                    &[],
                    *loc,
                );
                if let Some(unit) = unit {
                    let unit = UnitMap::parse(unit)
                        .map_err(|err| ParseError::new(line, *loc, err.code, err.details))?;
                    tree.node_mut(id).unit = Some(unit);
                }
                id
            }
            Syntax::Text { value, loc } => tree.add(
                OpKind::Constant {
                    value: Value::Text(value.clone()),
                    digits: None,
                },
                &[],
                *loc,
            ),
            Syntax::Ident { name, loc } => {
                let var = resolve(set, name, *loc, line)?;
                tree.add(OpKind::Variable(var), &[], *loc)
            }
            Syntax::Unary { op, operand, loc } => {
                let operand = self.lower(tree, operand, set, line)?;
                tree.add(OpKind::Unary(*op), &[operand], *loc)
            }
            Syntax::Binary {
                op,
                left,
                right,
                loc,
            } => {
                let left = self.lower(tree, left, set, line)?;
                let right = self.lower(tree, right, set, line)?;
                let kind = match op {
                    InfixOp::Arith(op) => OpKind::Binary(*op),
                    InfixOp::Compare(op) => OpKind::Comparison(*op),
                    InfixOp::Logic(op) => OpKind::Logical(*op),
                };
                tree.add(kind, &[left, right], *loc)
            }
            Syntax::Call { name, args, loc } => self.lower_call(tree, name, args, *loc, set, line)?,
            Syntax::Matrix { rows, loc } => {
                let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
                let mut elements = Vec::with_capacity(rows.len() * columns);
                for row in rows {
                    for element in row {
                        elements.push(self.lower(tree, element, set, line)?);
                    }
                    // short rows are padded with zeros
                    for _ in row.len()..columns {
                        let zero = tree.add(
                            OpKind::Constant {
                                value: Value::Scalar(0.0),
                                digits: None,
                            },
                            &[],
                            *loc,
                        );
                        elements.push(zero);
                    }
                }
                let kind = OpKind::MatrixBuild {
                    rows: if columns == 0 { 0 } else { rows.len() },
                    columns,
                };
                tree.add(kind, &elements, *loc)
            }
            Syntax::Split { parts, loc } => tree.add(
                OpKind::Split {
                    parts: parts.clone(),
                },
                &[],
                *loc,
            ),
        };
        Ok(id)
    }

    fn lower_call(
        &self,
        tree: &mut ExprTree,
        name: &str,
        args: &[Syntax],
        loc: Loc,
        set: &EquationSet,
        line: &str,
    ) -> ParseResult<NodeId> {
        match self.functions.get(&canonicalize(name)) {
            Some(Entry::Builtin(builtin)) => {
                let (min, max) = builtin.arity();
                if args.len() < min || args.len() > max {
                    return parse_err!(
                        line,
                        loc,
                        BadArity,
                        format!("{}() takes {} arguments, got {}", builtin.name(), arity_text(min, max), args.len())
                    );
                }
                let args = args
                    .iter()
                    .map(|arg| self.lower(tree, arg, set, line))
                    .collect::<ParseResult<Vec<NodeId>>>()?;
                Ok(tree.add(OpKind::Function(*builtin), &args, loc))
            }
            Some(Entry::Unsupported) => {
                parse_err!(line, loc, UnsupportedFunction, format!("{name}()"))
            }
            None if set.find(name).is_some() => {
                let var = resolve(set, name, loc, line)?;
                let target = tree.add(OpKind::Variable(var), &[], loc);
                let mut children = vec![target];
                for arg in args {
                    children.push(self.lower(tree, arg, set, line)?);
                }
                Ok(tree.add(
                    OpKind::ElementAccess {
                        sampling: Sampling::default(),
                    },
                    &children,
                    loc,
                ))
            }
            None => parse_err!(line, loc, UndefinedFunction, format!("{name}()")),
        }
    }
}

fn arity_text(min: usize, max: usize) -> String {
    if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min} to {max}")
    }
}

fn resolve(set: &EquationSet, name: &str, loc: Loc, line: &str) -> ParseResult<VarRef> {
    match set.find(name) {
        Some(id) => Ok(VarRef {
            id,
            name: set.get(id).full_name(),
        }),
        None => parse_err!(line, loc, UndefinedVariable, format!("'{name}'")),
    }
}

/// Significant digits written in a numeric literal.  Leading zeros never
/// count; trailing zeros count only after a decimal point.
pub fn significant_digits(text: &str) -> u32 {
    let text = text.trim().trim_start_matches(['-', '+']);
    let mantissa = match text.find(['e', 'E']) {
        Some(pos) => &text[..pos],
        None => text,
    };
    let has_point = mantissa.contains('.');
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_start_matches('0');
    let digits = if has_point {
        digits
    } else {
        digits.trim_end_matches('0')
    };
    (digits.len() as u32).max(1)
}
