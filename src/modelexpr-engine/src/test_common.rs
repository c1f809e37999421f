// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Common test infrastructure for building equation sets
//!
//! This module provides a builder-based API for assembling equation sets
//! from equation text, plus a small infix reader that turns that text into
//! [`Syntax`] the way an external parser would.

use crate::common::{ErrorCode, Loc, ParseError, ParseResult, Result};
use crate::equations::{Attribute, Equation, EquationSet, VarId};
use crate::op::{BinaryOp, ComparisonOp, ExprTree, LogicalOp, UnaryOp};
use crate::registry::{InfixOp, Registry, Syntax};
use crate::units::UnitMap;
use crate::value::ValueKind;

struct Declaration {
    name: String,
    /// (condition, expression) pairs as text.
    equations: Vec<(Option<String>, String)>,
    unit: Option<String>,
    ty: ValueKind,
    attributes: Vec<Attribute>,
    bound: Option<f64>,
}

/// Builder for equation sets used by pass-level tests
#[derive(Default)]
pub struct TestModel {
    declarations: Vec<Declaration>,
}

impl TestModel {
    pub fn new() -> Self {
        Default::default()
    }

    fn declaration(&mut self, name: &str) -> &mut Declaration {
        let index = match self.declarations.iter().position(|d| d.name == name) {
            Some(index) => index,
            None => {
                self.declarations.push(Declaration {
                    name: name.to_owned(),
                    equations: vec![],
                    unit: None,
                    ty: ValueKind::Scalar,
                    attributes: vec![],
                    bound: None,
                });
                self.declarations.len() - 1
            }
        };
        &mut self.declarations[index]
    }

    /// Add a variable defined by `equation`
    pub fn var(mut self, name: &str, equation: &str) -> Self {
        self.declaration(name)
            .equations
            .push((None, equation.to_owned()));
        self
    }

    /// Add a variable with declared units
    pub fn var_with_units(mut self, name: &str, equation: &str, units: &str) -> Self {
        let decl = self.declaration(name);
        decl.equations.push((None, equation.to_owned()));
        decl.unit = Some(units.to_owned());
        self
    }

    /// Add an equation that applies only while `condition` holds
    pub fn conditional(mut self, name: &str, condition: &str, equation: &str) -> Self {
        self.declaration(name)
            .equations
            .push((Some(condition.to_owned()), equation.to_owned()));
        self
    }

    /// Add a variable without equations, written from outside the set
    pub fn input(mut self, name: &str, units: Option<&str>) -> Self {
        let decl = self.declaration(name);
        decl.unit = units.map(|s| s.to_owned());
        self
    }

    pub fn matrix_input(mut self, name: &str) -> Self {
        self.declaration(name).ty = ValueKind::Matrix;
        self
    }

    pub fn attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.declaration(name).attributes.push(attribute);
        self
    }

    pub fn bound(mut self, name: &str, bound: f64) -> Self {
        self.declaration(name).bound = Some(bound);
        self
    }

    /// Build the equation set with the default builtins
    pub fn build(&self) -> Result<EquationSet> {
        self.build_with(&Registry::with_builtins())
    }

    /// Build the equation set.  Every variable is declared before any
    /// equation is read, so equations may reference each other freely.
    pub fn build_with(&self, registry: &Registry) -> Result<EquationSet> {
        let mut set = EquationSet::new();
        for decl in self.declarations.iter() {
            let mut var = crate::equations::Variable::new(&decl.name).with_type(decl.ty);
            if let Some(ref unit) = decl.unit {
                var = var.with_unit(UnitMap::parse(unit)?);
            }
            for &attribute in decl.attributes.iter() {
                var = var.with_attribute(attribute);
            }
            if let Some(bound) = decl.bound {
                var = var.with_bound(bound);
            }
            set.add_variable(var);
        }

        let mut defined: Vec<(VarId, Vec<Equation>)> = vec![];
        for decl in self.declarations.iter() {
            let mut equations = vec![];
            for (condition, expression) in decl.equations.iter() {
                let expression = build_tree(registry, expression, &set)?;
                let equation = match condition {
                    Some(condition) => {
                        Equation::conditional(build_tree(registry, condition, &set)?, expression)
                    }
                    None => Equation::new(expression),
                };
                equations.push(equation);
            }
            if let Some(id) = set.find(&decl.name) {
                defined.push((id, equations));
            }
        }
        for (id, equations) in defined {
            set.get_mut(id).equations = equations;
        }
        Ok(set)
    }
}

/// Read `text` and build it against `set`
pub fn build_tree(registry: &Registry, text: &str, set: &EquationSet) -> Result<ExprTree> {
    let syntax = parse(text)?;
    Ok(registry.build(&syntax, set, text)?)
}

/// The rendered expression of the first equation of `name`
pub fn rendered(set: &EquationSet, name: &str) -> Option<String> {
    let var = set.get(set.find(name)?);
    let equation = var.equations.first()?;
    Some(crate::render::render_tree(&equation.expression))
}

/// Read infix equation text into syntax
pub fn parse(text: &str) -> ParseResult<Syntax> {
    let mut reader = Reader {
        text,
        chars: text.char_indices().collect(),
        pos: 0,
    };
    let syntax = reader.expr(0)?;
    reader.skip_space();
    if reader.pos < reader.chars.len() {
        return reader.error(reader.offset(), "trailing input");
    }
    Ok(syntax)
}

struct Reader<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Reader<'_> {
    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.text.len())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error<T>(&self, at: usize, what: &str) -> ParseResult<T> {
        Err(ParseError::new(
            self.text,
            Loc::new(at, at + 1),
            ErrorCode::Generic,
            Some(what.to_owned()),
        ))
    }

    fn expect(&mut self, c: char) -> ParseResult<()> {
        self.skip_space();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            self.error(self.offset(), &format!("expected '{c}'"))
        }
    }

    /// The infix operator at the cursor with its precedence and whether
    /// it groups to the right, without consuming it.
    fn infix(&self) -> Option<(InfixOp, u8, bool, usize)> {
        use InfixOp::*;
        let two = (self.peek()?, self.peek_at(1));
        let (op, width) = match two {
            ('|', Some('|')) => (Logic(LogicalOp::Or), 2),
            ('&', Some('&')) => (Logic(LogicalOp::And), 2),
            ('<', Some('=')) => (Compare(ComparisonOp::Le), 2),
            ('>', Some('=')) => (Compare(ComparisonOp::Ge), 2),
            ('=', Some('=')) => (Compare(ComparisonOp::Eq), 2),
            ('!', Some('=')) => (Compare(ComparisonOp::Ne), 2),
            ('<', _) => (Compare(ComparisonOp::Lt), 1),
            ('>', _) => (Compare(ComparisonOp::Gt), 1),
            ('+', _) => (Arith(BinaryOp::Add), 1),
            ('-', _) => (Arith(BinaryOp::Subtract), 1),
            ('*', _) => (Arith(BinaryOp::Multiply), 1),
            ('&', _) => (Arith(BinaryOp::MultiplyElementwise), 1),
            ('/', _) => (Arith(BinaryOp::Divide), 1),
            ('%', _) => (Arith(BinaryOp::Modulo), 1),
            ('^', _) => (Arith(BinaryOp::Power), 1),
            _ => return None,
        };
        let (precedence, right) = match op {
            Logic(LogicalOp::Or) => (1, false),
            Logic(LogicalOp::And) => (2, false),
            Compare(_) => (3, false),
            Arith(BinaryOp::Add | BinaryOp::Subtract) => (4, false),
            Arith(BinaryOp::Power) => (7, true),
            Arith(_) => (5, false),
        };
        Some((op, precedence, right, width))
    }

    fn expr(&mut self, min: u8) -> ParseResult<Syntax> {
        let mut lhs = self.prefix()?;
        loop {
            self.skip_space();
            let Some((op, precedence, right, width)) = self.infix() else {
                break;
            };
            if precedence < min {
                break;
            }
            self.pos += width;
            let rhs = self.expr(if right { precedence } else { precedence + 1 })?;
            let loc = lhs.loc().union(&rhs.loc());
            lhs = Syntax::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> ParseResult<Syntax> {
        self.skip_space();
        let start = self.offset();
        let Some(c) = self.peek() else {
            return self.error(start, "unexpected end of input");
        };
        let unary = match c {
            '-' => Some(UnaryOp::Negate),
            '!' => Some(UnaryOp::Not),
            '~' => Some(UnaryOp::Transpose),
            _ => None,
        };
        if let Some(op) = unary {
            self.pos += 1;
            let operand = self.expr(6)?;
            let loc = Loc::new(start, operand.loc().end as usize);
            return Ok(Syntax::Unary {
                op,
                operand: Box::new(operand),
                loc,
            });
        }
        match c {
            '(' => {
                self.pos += 1;
                let inner = self.expr(0)?;
                self.expect(')')?;
                Ok(inner)
            }
            '[' => self.matrix(start),
            '"' => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.peek() {
                        Some('"') => break,
                        Some('\\') => {
                            self.pos += 1;
                            match self.peek() {
                                Some(c) => value.push(c),
                                None => return self.error(start, "unterminated string"),
                            }
                        }
                        Some(c) => value.push(c),
                        None => return self.error(start, "unterminated string"),
                    }
                    self.pos += 1;
                }
                self.pos += 1;
                Ok(Syntax::Text {
                    value,
                    loc: Loc::new(start, self.offset()),
                })
            }
            c if c.is_ascii_digit() || c == '.' => self.number(start),
            c if c.is_alphabetic() || c == '_' => self.name(start),
            _ => self.error(start, &format!("unexpected '{c}'")),
        }
    }

    fn number(&mut self, start: usize) -> ParseResult<Syntax> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '-' || c == '+') && text.ends_with(['e', 'E']);
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        let end = self.offset();
        self.skip_space();
        let mut unit = None;
        if self.peek() == Some('{') {
            self.pos += 1;
            let mut annotation = String::new();
            loop {
                match self.peek() {
                    Some('}') => break,
                    Some(c) => annotation.push(c),
                    None => return self.error(start, "unterminated unit"),
                }
                self.pos += 1;
            }
            self.pos += 1;
            unit = Some(annotation);
        }
        Ok(Syntax::Number {
            text,
            unit,
            loc: Loc::new(start, end),
        })
    }

    fn name(&mut self, start: usize) -> ParseResult<Syntax> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || (c == '\'' && !name.is_empty()) {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        let end = self.offset();
        self.skip_space();
        if self.peek() != Some('(') {
            return Ok(Syntax::Ident {
                name,
                loc: Loc::new(start, end),
            });
        }
        self.pos += 1;
        let mut args = vec![];
        self.skip_space();
        if self.peek() == Some(')') {
            self.pos += 1;
        } else {
            loop {
                args.push(self.expr(0)?);
                self.skip_space();
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return self.error(self.offset(), "expected ',' or ')'"),
                }
            }
        }
        let loc = Loc::new(start, self.offset());
        if name == "split" {
            let parts = args
                .into_iter()
                .map(|arg| match arg {
                    Syntax::Ident { name, .. } => Ok(name),
                    other => self.error(other.loc().start as usize, "split takes names"),
                })
                .collect::<ParseResult<Vec<String>>>()?;
            return Ok(Syntax::Split { parts, loc });
        }
        Ok(Syntax::Call { name, args, loc })
    }

    fn matrix(&mut self, start: usize) -> ParseResult<Syntax> {
        self.pos += 1;
        let mut rows: Vec<Vec<Syntax>> = vec![];
        let mut row = vec![];
        loop {
            self.skip_space();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                Some(';') => {
                    self.pos += 1;
                    rows.push(std::mem::take(&mut row));
                }
                Some(',') => self.pos += 1,
                Some(_) => row.push(self.expr(0)?),
                None => return self.error(start, "unterminated matrix"),
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        rows.retain(|r| !r.is_empty());
        Ok(Syntax::Matrix {
            rows,
            loc: Loc::new(start, self.offset()),
        })
    }
}
