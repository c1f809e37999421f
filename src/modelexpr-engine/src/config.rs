// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorCode, ErrorKind, Result};

/// Settings shared by the analysis passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Index of the most significant bit of the fixed-point mantissa.
    pub msb: i32,
    /// Upper bound on fixpoint iterations before a pass gives up.
    pub max_iterations: usize,
    /// Fail on incompatible units instead of logging them.
    pub strict_units: bool,
    /// Significant digits assumed for literals that don't state their own.
    pub default_digits: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            msb: 30,
            max_iterations: 100,
            strict_units: false,
            default_digits: 3,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|err| {
            Error::new(
                ErrorKind::Analysis,
                ErrorCode::Generic,
                Some(format!("bad analysis config: {err}")),
            )
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| {
            Error::new(ErrorKind::Analysis, ErrorCode::Generic, Some(err.to_string()))
        })
    }
}

#[test]
fn test_config_from_json() {
    let config = AnalysisConfig::from_json(r#"{"msb": 15, "strict_units": true}"#).unwrap();
    assert_eq!(15, config.msb);
    assert!(config.strict_units);
    assert_eq!(100, config.max_iterations);
    assert_eq!(3, config.default_digits);

    let round_trip = AnalysisConfig::from_json(&config.to_json().unwrap()).unwrap();
    assert_eq!(config, round_trip);

    assert_eq!(AnalysisConfig::default(), AnalysisConfig::from_json("{}").unwrap());
    assert!(AnalysisConfig::from_json("{\"msb\": \"wide\"}").is_err());
}
