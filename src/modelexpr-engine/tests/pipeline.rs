// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use float_cmp::approx_eq;
use proptest::prelude::*;

use modelexpr_engine::op::UNKNOWN;
use modelexpr_engine::simplify::simplify_tree;
use modelexpr_engine::test_common::{TestModel, rendered};
use modelexpr_engine::{
    AnalysisConfig, BinaryOp, ErrorCode, ErrorKind, EquationSet, ExponentAnalyzer, ExprTree, NoContext,
    Simplifier, analyze, check_units, eval_tree,
};

fn variable<'a>(set: &'a EquationSet, name: &str) -> &'a modelexpr_engine::Variable {
    set.get(set.find(name).unwrap())
}

#[test]
fn constants_fold_to_a_single_literal() {
    let mut set = TestModel::new().var("x", "2 + 3 * 4").build().unwrap();
    Simplifier::run(&mut set, &AnalysisConfig::default()).unwrap();
    assert_eq!(Some("14".to_owned()), rendered(&set, "x"));
}

#[test]
fn simplification_is_idempotent() {
    let mut set = TestModel::new()
        .input("input", None)
        .var("rate", "0.25")
        .var("c", "input")
        .var("flow", "c * rate * 1 + 0")
        .var("stock'", "flow - c * rate")
        .build()
        .unwrap();
    let config = AnalysisConfig::default();
    Simplifier::run(&mut set, &config).unwrap();
    let first: Vec<Option<String>> = ["c", "flow", "stock'"].iter().map(|n| rendered(&set, n)).collect();
    assert_eq!(Some("input * 0.25".to_owned()), first[1]);
    assert_eq!(Some("flow - input * 0.25".to_owned()), first[2]);

    assert_eq!(1, Simplifier::run(&mut set, &config).unwrap());
    let second: Vec<Option<String>> = ["c", "flow", "stock'"].iter().map(|n| rendered(&set, n)).collect();
    assert_eq!(first, second);
}

#[test]
fn aliases_fold_and_dependencies_follow() {
    let mut set = TestModel::new()
        .input("input", None)
        .var("c", "input")
        .var("d", "c + 10")
        .build()
        .unwrap();
    Simplifier::run(&mut set, &AnalysisConfig::default()).unwrap();
    assert_eq!(Some("input + 10".to_owned()), rendered(&set, "d"));

    let input = set.find("input").unwrap();
    let d = set.find("d").unwrap();
    assert!(variable(&set, "d").dependencies.contains(&input));
    assert!(set.dependents(input).contains(&d));
    assert!(!set.dependents(set.find("c").unwrap()).contains(&d));
}

#[test]
fn singular_not_surfaces_as_an_evaluation_error() {
    let mut set = TestModel::new().var("x", "![0, 0; 0, 0]").build().unwrap();
    let err = Simplifier::run(&mut set, &AnalysisConfig::default()).unwrap_err();
    assert_eq!(ErrorKind::Evaluation, err.kind);
    assert_eq!(ErrorCode::Singular, err.code);
}

#[test]
fn units_are_checked_against_declarations() {
    let model = TestModel::new()
        .input("distance", Some("m"))
        .input("time", Some("s"))
        .var_with_units("speed", "distance / time", "m/s")
        .var_with_units("wrong", "distance / time", "m")
        .var("scaled", "2 {m} * speed");

    let mut set = model.build().unwrap();
    let mismatches = check_units(&mut set, false).unwrap();
    assert_eq!(1, mismatches.len());
    assert_eq!("wrong", mismatches[0].variable);

    let mut set = model.var("sum", "distance + time").build().unwrap();
    let mismatches = check_units(&mut set, false).unwrap();
    assert!(mismatches.iter().any(|m| m.variable == "sum"));
    let err = check_units(&mut set, true).unwrap_err();
    assert_eq!(ErrorKind::Unit, err.kind);
    assert_eq!(ErrorCode::UnitMismatch, err.code);
}

#[test]
fn comparisons_bound_their_variables() {
    let mut set = TestModel::new()
        .input("x", None)
        .var("high", "x > 5")
        .var("low", "x < -20")
        .build()
        .unwrap();
    // the negated literal folds to a constant before the bound is read
    let mismatches = analyze(&mut set, &AnalysisConfig::default()).unwrap();
    assert!(mismatches.is_empty());
    let x = variable(&set, "x");
    assert_eq!(Some(20.0), x.bound);
    assert_eq!(4, x.exponent + x.center);
}

#[test]
fn repeated_bounds_keep_the_largest() {
    let mut set = TestModel::new()
        .input("x", None)
        .var("high", "x > 5")
        .var("low", "x < 5")
        .build()
        .unwrap();
    analyze(&mut set, &AnalysisConfig::default()).unwrap();
    let x = variable(&set, "x");
    assert_eq!(Some(5.0), x.bound);
    assert_eq!(2, x.exponent + x.center);

    let mut set = TestModel::new()
        .input("x", None)
        .var("low", "x < -20")
        .var("high", "x > 5")
        .build()
        .unwrap();
    analyze(&mut set, &AnalysisConfig::default()).unwrap();
    let x = variable(&set, "x");
    assert_eq!(Some(20.0), x.bound);
    assert_eq!(4, x.exponent + x.center);
}

#[test]
fn every_variable_is_resolved_after_analysis() {
    let mut set = TestModel::new()
        .input("x", None)
        .input("table", None)
        .var("y", "x * 1000 + 0.5")
        .var("z", "sqrt(y) / 3")
        .var("w", "table")
        .build()
        .unwrap();
    analyze(&mut set, &AnalysisConfig::default()).unwrap();
    for (_, var) in set.iter() {
        assert_ne!(UNKNOWN, var.exponent, "{}", var.name);
        assert_ne!(UNKNOWN, var.center, "{}", var.name);
    }
    assert!(ExponentAnalyzer::new(AnalysisConfig::default()).run(&mut set).is_ok());
}

#[test]
fn self_referencing_models_converge() {
    let mut set = TestModel::new().var("x", "x * x + 10").build().unwrap();
    analyze(&mut set, &AnalysisConfig::default()).unwrap();
    let x = variable(&set, "x");
    assert_eq!(3, x.exponent + x.center);
}

#[test]
fn slow_models_stop_at_the_iteration_cap() {
    let mut set = TestModel::new().var("x", "2").build().unwrap();
    let config = AnalysisConfig {
        max_iterations: 1,
        ..Default::default()
    };
    let err = ExponentAnalyzer::new(config).run(&mut set).unwrap_err();
    assert_eq!(ErrorCode::NotConverged, err.code);
}

#[test]
fn oversized_magnitudes_are_rejected() {
    let mut set = TestModel::new()
        .var("x", "1e300")
        .var("y", "x ^ 1000000")
        .build()
        .unwrap();
    let err = ExponentAnalyzer::new(AnalysisConfig::default()).run(&mut set).unwrap_err();
    assert_eq!(ErrorKind::Analysis, err.kind);
    assert_eq!(ErrorCode::ExponentOutOfRange, err.code);
}

fn chain(first: f64, rest: &[(u8, f64)]) -> ExprTree {
    ExprTree::build(|t| {
        let mut acc = t.constant(first);
        for &(op, value) in rest {
            let op = match op % 4 {
                0 => BinaryOp::Add,
                1 => BinaryOp::Subtract,
                2 => BinaryOp::Multiply,
                _ => BinaryOp::Divide,
            };
            let rhs = t.constant(value);
            acc = t.binary(op, acc, rhs);
        }
        acc
    })
}

proptest! {
    #[test]
    fn folding_matches_evaluation(
        first in -100.0f64..100.0,
        rest in prop::collection::vec((0u8..4, 1.0f64..100.0), 0..6),
    ) {
        let mut tree = chain(first, &rest);
        let expected = eval_tree(&tree, &NoContext).unwrap().as_scalar().unwrap();
        simplify_tree(&mut tree, &EquationSet::new(), None, &[]).unwrap();
        prop_assert_eq!(1, tree.len());
        let folded = tree.constant_scalar(tree.root()).unwrap();
        prop_assert!(approx_eq!(f64, expected, folded, ulps = 4));
    }
}
