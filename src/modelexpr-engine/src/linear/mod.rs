// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Matrix storage, kernels and factorizations backing matrix-valued
//! expressions.

pub mod boolean;
pub mod bunch_kaufman;
pub mod dense;
pub mod matrix;
pub mod qr;
pub mod sparse;
pub mod text;

pub use boolean::MatrixBoolean;
pub use bunch_kaufman::{FactorBunchKaufman, Pivot};
pub use dense::MatrixDense;
pub use matrix::{Matrix, Sampling};
pub use qr::FactorQr;
pub use sparse::MatrixSparse;
