// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::common::Result;
use crate::unit_err;

/// A physical unit as a product of named base units raised to integer
/// powers.  The empty map is dimensionless.
#[derive(Debug, Default, PartialEq, Eq, Clone, Hash)]
pub struct UnitMap {
    pub map: BTreeMap<String, i32>,
}

impl UnitMap {
    pub fn new() -> UnitMap {
        Default::default()
    }

    pub fn dimensionless() -> UnitMap {
        Default::default()
    }

    pub fn base(name: &str) -> UnitMap {
        [(name.to_owned(), 1)].into_iter().collect()
    }

    pub fn is_dimensionless(&self) -> bool {
        self.map.is_empty()
    }

    pub fn reciprocal(mut self) -> Self {
        for (_id, exp) in self.map.iter_mut() {
            *exp *= -1;
        }
        self
    }

    pub fn exp(mut self, exp: i32) -> Self {
        if exp == 0 {
            return UnitMap::dimensionless();
        }
        for (_id, unit) in self.map.iter_mut() {
            *unit *= exp;
        }
        self
    }

    /// Parse a unit string such as `kg*m/s^2`.  Each `/` divides by the
    /// single factor that follows it.  `1` and `dmnl` are dimensionless.
    pub fn parse(text: &str) -> Result<UnitMap> {
        let mut result = UnitMap::new();
        let mut chars = text.chars().peekable();
        let mut divide = false;
        let mut expect_factor = true;
        let mut saw_operator = false;

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }
            if c == '*' || c == '/' {
                if expect_factor {
                    return unit_err!(BadUnit, format!("missing unit before '{c}' in '{text}'"));
                }
                chars.next();
                divide = c == '/';
                expect_factor = true;
                saw_operator = true;
                continue;
            }
            if !expect_factor {
                return unit_err!(BadUnit, format!("expected '*' or '/' in '{text}'"));
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '*' || c == '/' || c == '^' {
                    break;
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return unit_err!(BadUnit, format!("missing unit name in '{text}'"));
            }

            let mut power = 1;
            if chars.peek() == Some(&'^') {
                chars.next();
                let mut digits = String::new();
                if chars.peek() == Some(&'-') {
                    digits.push('-');
                    chars.next();
                }
                while let Some(&c) = chars.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    digits.push(c);
                    chars.next();
                }
                power = match digits.parse::<i32>() {
                    Ok(p) => p,
                    Err(_) => {
                        return unit_err!(BadUnit, format!("bad exponent for '{name}' in '{text}'"));
                    }
                };
            }

            let factor = if name == "1" || name == "dmnl" {
                UnitMap::dimensionless()
            } else if name.chars().all(|c| c.is_alphanumeric() || "_$%.".contains(c)) {
                UnitMap::base(&name).exp(power)
            } else {
                return unit_err!(BadUnit, format!("bad unit name '{name}'"));
            };
            result = if divide { result / factor } else { result * factor };
            expect_factor = false;
        }

        if expect_factor && saw_operator {
            return unit_err!(BadUnit, format!("trailing operator in '{text}'"));
        }
        Ok(result)
    }
}

impl std::ops::Div for UnitMap {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn div(self, rhs: Self) -> Self::Output {
        self * rhs.reciprocal()
    }
}

impl std::ops::Mul for UnitMap {
    type Output = Self;

    fn mul(mut self, rhs: Self) -> Self::Output {
        for (unit, n) in rhs.map.into_iter() {
            let new_value = match self.map.get(&unit) {
                None => n,
                Some(m) => n + *m,
            };

            if new_value == 0 {
                self.map.remove(&unit);
            } else {
                self.map.insert(unit, new_value);
            }
        }
        self
    }
}

impl Display for UnitMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut written = false;
        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp > 0) {
            if written {
                write!(f, "*")?;
            }
            write!(f, "{unit}")?;
            if *exp > 1 {
                write!(f, "^{exp}")?;
            }
            written = true;
        }

        for (unit, exp) in self.map.iter().filter(|(_, exp)| **exp < 0) {
            if !written {
                write!(f, "1")?;
                written = true;
            }
            write!(f, "/{unit}")?;
            if exp.abs() > 1 {
                write!(f, "^{}", exp.abs())?;
            }
        }

        if !written {
            write!(f, "dmnl")?;
        }

        Ok(())
    }
}

impl FromIterator<(String, i32)> for UnitMap {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        UnitMap {
            map: iter.into_iter().filter(|(_, exp)| *exp != 0).collect(),
        }
    }
}

#[test]
fn test_pretty_print_unit() {
    let cases: &[(&str, &str)] = &[
        ("m^2/s", "m^2/s"),
        ("person * person * person", "person^3"),
        ("m^2/m", "m"),
        ("m*people/time", "m*people/time"),
        ("time * people / time", "people"),
        ("1", "dmnl"),
        ("1/dmnl", "dmnl"),
        ("1/s", "1/s"),
        ("1/s/m", "1/m/s"),
        ("kg*m/s^2", "kg*m/s^2"),
        ("s^-1", "1/s"),
        ("", "dmnl"),
    ];

    for (input, output) in cases {
        let unit = UnitMap::parse(input).unwrap();
        assert_eq!(*output, format!("{unit}"), "{input}");
    }
}

#[test]
fn test_bad_units() {
    for input in ["*m", "m/", "m s", "m^x", "m^", "k(g)"] {
        let err = UnitMap::parse(input).unwrap_err();
        assert_eq!(crate::common::ErrorCode::BadUnit, err.code, "{input}");
    }
}

#[test]
fn test_unit_algebra() {
    let speed = UnitMap::parse("m/s").unwrap();
    let time = UnitMap::parse("s").unwrap();
    assert_eq!(UnitMap::base("m"), speed.clone() * time.clone());
    assert_eq!(UnitMap::parse("m/s^2").unwrap(), speed.clone() / time);
    assert_eq!(UnitMap::parse("m^2/s^2").unwrap(), speed.clone().exp(2));
    assert!(speed.clone().exp(0).is_dimensionless());
    assert!((speed.clone() / speed).is_dimensionless());
}
