// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// Re-export all common types from modelexpr-core
pub use modelexpr_core::common::*;

// Macros for error creation - these need to stay in modelexpr-engine
// as they use crate-local paths

#[macro_export]
macro_rules! eval_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Evaluation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Evaluation, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! linear_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Linear, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Linear, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! unit_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Unit, ErrorCode::$code, Some($str)))
    }};
}

#[macro_export]
macro_rules! analysis_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Analysis, ErrorCode::$code, Some($str)))
    }};
}

#[macro_export]
macro_rules! parse_err(
    ($line:expr, $loc:expr, $code:tt) => {{
        use $crate::common::{ErrorCode, ParseError};
        Err(ParseError::new($line, $loc, ErrorCode::$code, None))
    }};
    ($line:expr, $loc:expr, $code:tt, $str:expr) => {{
        use $crate::common::{ErrorCode, ParseError};
        Err(ParseError::new($line, $loc, ErrorCode::$code, Some($str)))
    }};
);

#[test]
fn test_error_macros() {
    let err: Result<()> = eval_err!(TypeMismatch, "text * matrix".to_owned());
    let err = err.unwrap_err();
    assert_eq!(ErrorKind::Evaluation, err.kind);
    assert_eq!(ErrorCode::TypeMismatch, err.code);
    assert_eq!(Some("text * matrix".to_owned()), err.get_details());

    let err: Result<()> = linear_err!(NotSquare);
    assert_eq!(ErrorKind::Linear, err.unwrap_err().kind);

    let err: ParseResult<()> = parse_err!("a + b", Loc::new(2, 3), BadArity);
    assert_eq!(2, err.unwrap_err().column());
}
