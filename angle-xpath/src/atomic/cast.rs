//! Atomic casts following the lexical-space rules: ISO 8601 for dates,
//! `true`/`false`/`1`/`0` for booleans, locale-independent numbers.

use angle_xpath_ast::SchemaType;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::{parse_double, Atomic};
use crate::error::{Error, Result};

impl Atomic {
    pub fn cast_to(&self, target: SchemaType) -> Result<Atomic> {
        let cast = match target {
            SchemaType::Untyped => Some(Atomic::Untyped(self.string_value())),
            SchemaType::Any | SchemaType::AnyAtomic => Some(self.clone()),
            SchemaType::String => Some(Atomic::String(self.string_value())),
            SchemaType::Boolean => self.cast_boolean(),
            SchemaType::Integer => self.cast_integer(),
            SchemaType::Decimal => self.cast_decimal(),
            SchemaType::Double => self.cast_double(),
            SchemaType::Date => self.cast_date(),
            SchemaType::DateTime => self.cast_datetime(),
        };
        cast.ok_or_else(|| Error::Cast {
            value: self.string_value(),
            target: target.to_string(),
        })
    }

    pub fn castable(&self, target: SchemaType) -> bool {
        self.cast_to(target).is_ok()
    }

    fn cast_boolean(&self) -> Option<Atomic> {
        let value = match self {
            Atomic::Boolean(b) => *b,
            Atomic::Integer(i) => *i != 0,
            Atomic::Decimal(d) => !d.is_zero(),
            Atomic::Double(d) => *d != 0.0 && !d.is_nan(),
            Atomic::Untyped(s) | Atomic::String(s) => match s.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return None,
            },
            _ => return None,
        };
        Some(Atomic::Boolean(value))
    }

    fn cast_integer(&self) -> Option<Atomic> {
        let value = match self {
            Atomic::Integer(i) => *i,
            // numeric to integer truncates toward zero
            Atomic::Double(d) if d.is_finite() => d.trunc() as i64,
            Atomic::Decimal(d) => rust_decimal::prelude::ToPrimitive::to_i64(&d.trunc())?,
            Atomic::Boolean(b) => *b as i64,
            Atomic::Untyped(s) | Atomic::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(Atomic::Integer(value))
    }

    fn cast_decimal(&self) -> Option<Atomic> {
        let value = match self {
            Atomic::Decimal(d) => *d,
            Atomic::Integer(i) => Decimal::from(*i),
            Atomic::Double(d) => Decimal::from_f64(*d)?,
            Atomic::Boolean(b) => Decimal::from(*b as i64),
            Atomic::Untyped(s) | Atomic::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(Atomic::Decimal(value))
    }

    fn cast_double(&self) -> Option<Atomic> {
        let value = match self {
            Atomic::Double(d) => *d,
            Atomic::Integer(i) => *i as f64,
            Atomic::Decimal(d) => rust_decimal::prelude::ToPrimitive::to_f64(d)?,
            Atomic::Boolean(b) => *b as i64 as f64,
            Atomic::Untyped(s) | Atomic::String(s) => parse_double(s)?,
            _ => return None,
        };
        Some(Atomic::Double(value))
    }

    fn cast_date(&self) -> Option<Atomic> {
        let value = match self {
            Atomic::Date(d) => *d,
            Atomic::DateTime(dt) => dt.date_naive(),
            Atomic::Untyped(s) | Atomic::String(s) => parse_date(s)?,
            _ => return None,
        };
        Some(Atomic::Date(value))
    }

    fn cast_datetime(&self) -> Option<Atomic> {
        let value = match self {
            Atomic::DateTime(dt) => *dt,
            Atomic::Date(d) => Utc
                .from_utc_datetime(&NaiveDateTime::new(
                    *d,
                    NaiveTime::from_hms_opt(0, 0, 0)?,
                ))
                .fixed_offset(),
            Atomic::Untyped(s) | Atomic::String(s) => parse_datetime(s)?,
            _ => return None,
        };
        Some(Atomic::DateTime(value))
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // a trailing timezone is accepted and ignored
    let s = s.strip_suffix('Z').unwrap_or(s);
    let s = match s.char_indices().nth(10) {
        Some((10, '+' | '-')) => &s[..10],
        _ => s,
    };
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    // no timezone: interpret as UTC
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()?;
    Some(Utc.from_utc_datetime(&naive).fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_integer() {
        let cast = Atomic::String(" 42 ".to_string())
            .cast_to(SchemaType::Integer)
            .unwrap();
        assert_eq!(cast, Atomic::Integer(42));
    }

    #[test]
    fn double_truncates_to_integer() {
        let cast = Atomic::Double(-3.9).cast_to(SchemaType::Integer).unwrap();
        assert_eq!(cast, Atomic::Integer(-3));
    }

    #[test]
    fn boolean_lexical_space() {
        assert_eq!(
            Atomic::String("1".to_string())
                .cast_to(SchemaType::Boolean)
                .unwrap(),
            Atomic::Boolean(true)
        );
        assert!(Atomic::String("yes".to_string())
            .cast_to(SchemaType::Boolean)
            .is_err());
    }

    #[test]
    fn date_lexical_space() {
        let cast = Atomic::String("2024-02-29".to_string())
            .cast_to(SchemaType::Date)
            .unwrap();
        assert_eq!(cast.string_value(), "2024-02-29");
        assert!(Atomic::String("2024-02-30".to_string())
            .cast_to(SchemaType::Date)
            .is_err());
    }

    #[test]
    fn datetime_round_trip() {
        let cast = Atomic::String("2024-01-02T03:04:05+01:00".to_string())
            .cast_to(SchemaType::DateTime)
            .unwrap();
        assert_eq!(cast.string_value(), "2024-01-02T03:04:05+01:00");
    }

    #[test]
    fn castable_mirrors_cast() {
        let value = Atomic::String("abc".to_string());
        assert!(!value.castable(SchemaType::Integer));
        assert!(value.castable(SchemaType::String));
        assert_eq!(
            value.castable(SchemaType::Double),
            value.cast_to(SchemaType::Double).is_ok()
        );
    }

    #[test]
    fn cast_then_instance_of_holds() {
        let value = Atomic::String("10.5".to_string());
        let cast = value.cast_to(SchemaType::Decimal).unwrap();
        assert!(cast.schema_type().is_subtype_of(SchemaType::Decimal));
    }
}
