// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NoError, // will never be produced
    Generic,
    // evaluation
    TypeMismatch,
    UnsupportedOperation,
    NoInstanceContext,
    UndefinedVariable,
    IndexOutOfRange,
    // linear algebra
    Singular,
    NotSquare,
    NotSymmetric,
    RankDeficient,
    DimensionMismatch,
    BadMatrixText,
    // building operators from syntax
    UnsupportedFunction,
    UndefinedFunction,
    BadArity,
    ExpectedNumber,
    // units
    UnitMismatch,
    BadUnit,
    // analysis drivers
    NotConverged,
    ExponentOutOfRange,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            Generic => "generic",
            TypeMismatch => "type_mismatch",
            UnsupportedOperation => "unsupported_operation",
            NoInstanceContext => "no_instance_context",
            UndefinedVariable => "undefined_variable",
            IndexOutOfRange => "index_out_of_range",
            Singular => "singular",
            NotSquare => "not_square",
            NotSymmetric => "not_symmetric",
            RankDeficient => "rank_deficient",
            DimensionMismatch => "dimension_mismatch",
            BadMatrixText => "bad_matrix_text",
            UnsupportedFunction => "unsupported_function",
            UndefinedFunction => "undefined_function",
            BadArity => "bad_arity",
            ExpectedNumber => "expected_number",
            UnitMismatch => "unit_mismatch",
            BadUnit => "bad_unit",
            NotConverged => "not_converged",
            ExponentOutOfRange => "exponent_out_of_range",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Evaluation,
    Linear,
    Parse,
    Unit,
    Analysis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Evaluation => "EvaluationError",
            ErrorKind::Linear => "LinearAlgebraError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Unit => "UnitError",
            ErrorKind::Analysis => "AnalysisError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error {
            kind: ErrorKind::Parse,
            code: err.code,
            details: Some(err.to_string()),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
pub type ParseResult<T> = result::Result<T, ParseError>;

/// Loc describes a span of columns within a single line of equation text.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    /// union takes a second Loc and returns the inclusive range from the
    /// start of the earlier token to the end of the later token.
    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

/// ParseError is raised while turning syntax into operators.  It keeps
/// the offending line so a caret diagnostic can be shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParseError {
    pub line: String,
    pub loc: Loc,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl ParseError {
    pub fn new(line: &str, loc: Loc, code: ErrorCode, details: Option<String>) -> Self {
        ParseError {
            line: line.to_owned(),
            loc,
            code,
            details,
        }
    }

    pub fn column(&self) -> usize {
        self.loc.start as usize
    }

    /// caret_diagnostic renders the source line with a `^` under the
    /// first offending column, followed by the error message.
    pub fn caret_diagnostic(&self) -> String {
        let column = self.column().min(self.line.chars().count());
        let mut pointer = String::with_capacity(column + 1);
        pointer.extend(std::iter::repeat_n(' ', column));
        pointer.push('^');
        let message = match self.details {
            Some(ref details) => format!("{}: {}", self.code, details),
            None => format!("{}", self.code),
        };
        format!("{}\n{}\n{}", self.line, pointer, message)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.details {
            Some(ref details) => write!(f, "{}:{} -- {}", self.loc, self.code, details),
            None => write!(f, "{}:{}", self.loc, self.code),
        }
    }
}

impl error::Error for ParseError {}

/// canonicalize normalizes a variable name as it appears in source:
/// surrounding whitespace is dropped and interior runs of whitespace
/// collapse to a single underscore.  Case is significant.
pub fn canonicalize(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            result.push('_');
            pending_space = false;
        }
        result.push(c);
    }
    result
}

#[test]
fn test_loc_basics() {
    let a = Loc { start: 3, end: 7 };
    assert_eq!(a, Loc::new(3, 7));

    let b = Loc { start: 4, end: 11 };
    assert_eq!(Loc::new(3, 11), a.union(&b));

    let c = Loc { start: 1, end: 5 };
    assert_eq!(Loc::new(1, 7), a.union(&c));
}

#[test]
fn test_canonicalize() {
    assert_eq!("a_b", canonicalize("   a b"));
    assert_eq!("a_b", canonicalize("a \n b"));
    assert_eq!("V.x", canonicalize("V.x"));
    assert_eq!("Hello_World", canonicalize(" Hello\tWorld "));
    assert_eq!("", canonicalize("   "));
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Evaluation,
        ErrorCode::Singular,
        Some("matrix inverse".to_owned()),
    );
    assert_eq!("EvaluationError{singular: matrix inverse}", format!("{err}"));

    let err = Error::new(ErrorKind::Linear, ErrorCode::NotSquare, None);
    assert_eq!("LinearAlgebraError{not_square}", format!("{err}"));
}

#[test]
fn test_caret_diagnostic() {
    let err = ParseError::new(
        "a + frob(b)",
        Loc::new(4, 8),
        ErrorCode::UndefinedFunction,
        Some("frob".to_owned()),
    );
    let diagnostic = err.caret_diagnostic();
    let lines: Vec<&str> = diagnostic.lines().collect();
    assert_eq!(3, lines.len());
    assert_eq!("a + frob(b)", lines[0]);
    assert_eq!("    ^", lines[1]);
    assert_eq!("undefined_function: frob", lines[2]);

    // a column past the end of the line still points at the end
    let err = ParseError::new("x", Loc::new(9, 10), ErrorCode::BadArity, None);
    assert_eq!("x\n ^\nbad_arity", err.caret_diagnostic());

    let converted: Error = err.into();
    assert_eq!(ErrorKind::Parse, converted.kind);
    assert_eq!(ErrorCode::BadArity, converted.code);
}
