// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(
    clippy::float_cmp,
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::pattern_type_mismatch
)]

use core::cmp::Ordering;
use core::fmt::{self, Debug, Display, Formatter};
use core::str::FromStr;

use anyhow::{bail, Result};
use serde::ser::Serializer;
use serde::Serialize;

/// A numeric value carrying the width it was written with.
///
/// Equality and ordering are numeric, so `Integer(3) == Long(3) == Double(3.0)`.
#[derive(Clone, Copy)]
pub enum Number {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

// 2^53: integers up to this magnitude survive a round trip through f64.
const F64_SAFE_INTEGER: i64 = 9_007_199_254_740_992;
// 2^24 for f32.
const F32_SAFE_INTEGER: i64 = 16_777_216;

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(i) => *i as f64,
            Number::Long(l) => *l as f64,
            Number::Float(f) => *f as f64,
            Number::Double(d) => *d,
        }
    }

    /// The value as an i64 if it is integral and in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Integer(i) => Some(*i as i64),
            Number::Long(l) => Some(*l),
            Number::Float(f) => integral_f64(*f as f64),
            Number::Double(d) => integral_f64(*d),
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Number::Integer(_) | Number::Long(_))
    }

    /// Converts to an `Integer` if no information is lost.
    pub fn to_integer(&self) -> Option<Number> {
        self.as_i64()
            .and_then(|l| i32::try_from(l).ok())
            .map(Number::Integer)
    }

    /// Converts to a `Long` if no information is lost.
    pub fn to_long(&self) -> Option<Number> {
        self.as_i64().map(Number::Long)
    }

    /// Converts to a `Float`.
    ///
    /// Integers must be exactly representable. A double is accepted when its shortest
    /// decimal form reads back identically from the float, so a double written as `3.14`
    /// converts while one carrying more precision than a float holds does not.
    pub fn to_float(&self) -> Option<Number> {
        match self {
            Number::Integer(i) => {
                let l = *i as i64;
                (l.abs() <= F32_SAFE_INTEGER).then_some(Number::Float(*i as f32))
            }
            Number::Long(l) => (l.abs() <= F32_SAFE_INTEGER).then_some(Number::Float(*l as f32)),
            Number::Float(f) => Some(Number::Float(*f)),
            Number::Double(d) => {
                if !d.is_finite() {
                    return Some(Number::Float(*d as f32));
                }
                let f = *d as f32;
                if !f.is_finite() {
                    return None;
                }
                match f.to_string().parse::<f64>() {
                    Ok(back) if back == *d => Some(Number::Float(f)),
                    _ => None,
                }
            }
        }
    }

    /// Converts to a `Double` if no information is lost.
    pub fn to_double(&self) -> Option<Number> {
        match self {
            Number::Integer(i) => Some(Number::Double(*i as f64)),
            Number::Long(l) => (l.abs() <= F64_SAFE_INTEGER).then_some(Number::Double(*l as f64)),
            Number::Float(f) => f.to_string().parse::<f64>().ok().map(Number::Double),
            Number::Double(d) => Some(Number::Double(*d)),
        }
    }
}

fn integral_f64(d: f64) -> Option<i64> {
    if !d.is_finite() || d.fract() != 0.0 || d.abs() > F64_SAFE_INTEGER as f64 {
        return None;
    }
    Some(d as i64)
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) if self.is_integral() || other.is_integral() => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Integer(_) | Number::Long(_), Number::Integer(_) | Number::Long(_)) => {
                self.as_i64().cmp(&other.as_i64())
            }
            _ => self.as_f64().total_cmp(&other.as_f64()),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Long(l) => write!(f, "{l}"),
            Number::Float(v) => write!(f, "{v}"),
            Number::Double(v) => write!(f, "{v}"),
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{i}i"),
            Number::Long(l) => write!(f, "{l}L"),
            Number::Float(v) => write!(f, "{v}f"),
            Number::Double(v) => write!(f, "{v}d"),
        }
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::Integer(i) => serializer.serialize_i32(*i),
            Number::Long(l) => serializer.serialize_i64(*l),
            Number::Float(v) => serializer.serialize_f32(*v),
            Number::Double(v) => serializer.serialize_f64(*v),
        }
    }
}

/// Parses the narrowest of integer, long or double that represents the text.
impl FromStr for Number {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i32>() {
            return Ok(Number::Integer(i));
        }
        if let Ok(l) = s.parse::<i64>() {
            return Ok(Number::Long(l));
        }
        match s.parse::<f64>() {
            Ok(d) => Ok(Number::Double(d)),
            Err(_) => bail!("'{s}' is not a number"),
        }
    }
}

impl From<i32> for Number {
    fn from(n: i32) -> Self {
        Number::Integer(n)
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::Long(n)
    }
}

impl From<f32> for Number {
    fn from(n: f32) -> Self {
        Number::Float(n)
    }
}

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        Number::Double(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_across_widths() {
        assert_eq!(Number::Integer(3), Number::Long(3));
        assert_eq!(Number::Integer(3), Number::Double(3.0));
        assert_eq!(Number::Float(0.5), Number::Double(0.5));
        assert_ne!(Number::Integer(3), Number::Double(3.5));
    }

    #[test]
    fn lossless_conversions() {
        assert_eq!(Number::Long(7).to_integer(), Some(Number::Integer(7)));
        assert_eq!(Number::Long(4_000_000_000_000).to_integer(), None);
        assert_eq!(Number::Double(1.5).to_integer(), None);
        assert_eq!(Number::Double(2.0).to_long(), Some(Number::Long(2)));
        assert_eq!(Number::Integer(3).to_double(), Some(Number::Double(3.0)));
        assert!(Number::Double(3.14).to_float().is_some());
        assert!(Number::Double(0.1 + 0.2).to_float().is_none());
        assert_eq!(Number::Long(F64_SAFE_INTEGER + 1).to_double(), None);
    }

    #[test]
    fn parse_narrowest() -> Result<()> {
        assert!(matches!("3".parse::<Number>()?, Number::Integer(3)));
        assert!(matches!("4000000000000".parse::<Number>()?, Number::Long(4_000_000_000_000)));
        assert!(matches!("1.5".parse::<Number>()?, Number::Double(_)));
        assert!("one".parse::<Number>().is_err());
        Ok(())
    }
}
