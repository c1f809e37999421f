// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;
pub mod config;
pub mod equations;
pub mod eval;
pub mod fixedpoint;
pub mod linear;
pub mod op;
pub mod progress;
pub mod registry;
pub mod render;
pub mod simplify;
pub mod traverse;
pub mod unit_check;
pub mod units;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod test_common;

pub use self::common::{Error, ErrorCode, ErrorKind, Loc, ParseError, ParseResult, Result, canonicalize};
pub use self::config::AnalysisConfig;
pub use self::equations::{Attribute, Equation, EquationSet, VarId, Variable};
pub use self::eval::{EvalContext, NoContext, eval, eval_tree};
pub use self::fixedpoint::ExponentAnalyzer;
pub use self::linear::{FactorBunchKaufman, FactorQr, Matrix, MatrixBoolean, MatrixDense, MatrixSparse, Sampling};
pub use self::op::{BinaryOp, Builtin, ComparisonOp, ExprTree, LogicalOp, NodeId, OpKind, UnaryOp, VarRef};
pub use self::progress::Progress;
pub use self::registry::{Registry, Syntax};
pub use self::render::render_tree;
pub use self::simplify::Simplifier;
pub use self::unit_check::{UnitMismatch, check_units};
pub use self::units::UnitMap;
pub use self::value::{Value, ValueKind};

/// Runs the static passes over an equation set in order: constant and
/// alias simplification, unit checking, then exponent analysis.
pub fn analyze(set: &mut EquationSet, config: &AnalysisConfig) -> Result<Vec<UnitMismatch>> {
    Simplifier::run(set, config)?;
    let mismatches = check_units(set, config.strict_units)?;
    ExponentAnalyzer::new(config.clone()).run(set)?;
    Ok(mismatches)
}
