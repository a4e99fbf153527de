//! Atomic values and the rules for casting, comparing and doing arithmetic
//! on them.

mod cast;
mod compare;
mod ops;

pub(crate) use compare::{atomic_equal, compare_atomics};
pub(crate) use ops::arithmetic;

use std::rc::Rc;

use angle_xpath_ast::SchemaType;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::sequence::Sequence;

/// An atomic item: one of the value types of the data model.
#[derive(Debug, Clone, PartialEq)]
pub enum Atomic {
    /// Untyped data, as produced by atomizing a node.
    Untyped(String),
    String(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Binary(Vec<u8>),
    Array(Rc<Vec<Sequence>>),
    Map(Rc<Vec<(Atomic, Sequence)>>),
}

impl Atomic {
    /// The canonical lexical form.
    pub fn string_value(&self) -> String {
        match self {
            Atomic::Untyped(s) | Atomic::String(s) => s.clone(),
            Atomic::Boolean(b) => b.to_string(),
            Atomic::Integer(i) => i.to_string(),
            Atomic::Decimal(d) => d.to_string(),
            Atomic::Double(d) => format_double(*d),
            Atomic::Date(d) => d.format("%Y-%m-%d").to_string(),
            Atomic::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            Atomic::Binary(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            Atomic::Array(members) => members
                .iter()
                .map(|s| s.string_values_joined(" "))
                .collect::<Vec<_>>()
                .join(" "),
            Atomic::Map(_) => String::new(),
        }
    }

    pub fn schema_type(&self) -> SchemaType {
        match self {
            Atomic::Untyped(_) => SchemaType::Untyped,
            Atomic::String(_) => SchemaType::String,
            Atomic::Boolean(_) => SchemaType::Boolean,
            Atomic::Integer(_) => SchemaType::Integer,
            Atomic::Decimal(_) => SchemaType::Decimal,
            Atomic::Double(_) => SchemaType::Double,
            Atomic::Date(_) => SchemaType::Date,
            Atomic::DateTime(_) => SchemaType::DateTime,
            Atomic::Binary(_) | Atomic::Array(_) | Atomic::Map(_) => SchemaType::AnyAtomic,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Atomic::Integer(_) | Atomic::Decimal(_) | Atomic::Double(_)
        )
    }

    /// The effective boolean value of a singleton atomic.
    pub fn effective_boolean(&self) -> Result<bool> {
        match self {
            Atomic::Boolean(b) => Ok(*b),
            Atomic::Untyped(s) | Atomic::String(s) => Ok(!s.is_empty()),
            Atomic::Integer(i) => Ok(*i != 0),
            Atomic::Decimal(d) => Ok(!d.is_zero()),
            Atomic::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            other => Err(Error::Type(format!(
                "no effective boolean value for {}",
                other.schema_type()
            ))),
        }
    }

    /// Numeric reading as a double; `NaN` when the lexical form does not
    /// parse, mirroring `fn:number`.
    pub fn as_double(&self) -> f64 {
        match self {
            Atomic::Integer(i) => *i as f64,
            Atomic::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            Atomic::Double(d) => *d,
            Atomic::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Atomic::Untyped(s) | Atomic::String(s) => parse_double(s).unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Integer reading, for positions and ranges.
    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Atomic::Integer(i) => Ok(*i),
            Atomic::Double(d) if d.fract() == 0.0 => Ok(*d as i64),
            Atomic::Decimal(d) if d.fract().is_zero() => d
                .to_i64()
                .ok_or_else(|| Error::Type("integer out of range".to_string())),
            Atomic::Untyped(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::Type(format!("'{}' is not an integer", s))),
            other => Err(Error::Type(format!(
                "expected an integer, got {}",
                other.schema_type()
            ))),
        }
    }
}

pub(crate) fn format_double(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub(crate) fn parse_double(s: &str) -> Option<f64> {
    match s.trim() {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        trimmed => trimmed.parse().ok(),
    }
}

impl From<String> for Atomic {
    fn from(s: String) -> Self {
        Atomic::String(s)
    }
}

impl From<&str> for Atomic {
    fn from(s: &str) -> Self {
        Atomic::String(s.to_string())
    }
}

impl From<bool> for Atomic {
    fn from(b: bool) -> Self {
        Atomic::Boolean(b)
    }
}

impl From<i64> for Atomic {
    fn from(i: i64) -> Self {
        Atomic::Integer(i)
    }
}

impl From<f64> for Atomic {
    fn from(d: f64) -> Self {
        Atomic::Double(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_print_like_integers_when_integral() {
        assert_eq!(Atomic::Double(3.0).string_value(), "3");
        assert_eq!(Atomic::Double(3.5).string_value(), "3.5");
        assert_eq!(Atomic::Double(f64::NAN).string_value(), "NaN");
        assert_eq!(Atomic::Double(f64::INFINITY).string_value(), "INF");
    }

    #[test]
    fn effective_boolean_rules() {
        assert!(Atomic::Boolean(true).effective_boolean().unwrap());
        assert!(!Atomic::String(String::new()).effective_boolean().unwrap());
        assert!(Atomic::String("x".to_string()).effective_boolean().unwrap());
        assert!(!Atomic::Double(f64::NAN).effective_boolean().unwrap());
        assert!(!Atomic::Integer(0).effective_boolean().unwrap());
        assert!(Atomic::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .effective_boolean()
            .is_err());
    }
}
