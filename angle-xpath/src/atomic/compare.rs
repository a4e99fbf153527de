//! Value comparison between two atomics.

use std::cmp::Ordering;

use super::Atomic;
use crate::error::{Error, Result};

/// Compare two atomics after the usual promotions: untyped data adapts to
/// the other operand, numerics compare through double, strings compare by
/// code point. `Ok(None)` means incomparable by value (NaN).
pub(crate) fn compare_atomics(left: &Atomic, right: &Atomic) -> Result<Option<Ordering>> {
    use Atomic::*;
    match (left, right) {
        (Boolean(a), Boolean(b)) => Ok(Some(a.cmp(b))),
        (Boolean(_), Untyped(s)) => {
            let b = cast_bool(s)?;
            compare_atomics(left, &Boolean(b))
        }
        (Untyped(s), Boolean(_)) => {
            let b = cast_bool(s)?;
            compare_atomics(&Boolean(b), right)
        }
        (Date(a), Date(b)) => Ok(Some(a.cmp(b))),
        (DateTime(a), DateTime(b)) => Ok(Some(a.cmp(b))),
        (Date(_), Untyped(_)) => {
            let cast = right.cast_to(angle_xpath_ast::SchemaType::Date)?;
            compare_atomics(left, &cast)
        }
        (Untyped(_), Date(_)) => {
            let cast = left.cast_to(angle_xpath_ast::SchemaType::Date)?;
            compare_atomics(&cast, right)
        }
        (DateTime(_), Untyped(_)) => {
            let cast = right.cast_to(angle_xpath_ast::SchemaType::DateTime)?;
            compare_atomics(left, &cast)
        }
        (Untyped(_), DateTime(_)) => {
            let cast = left.cast_to(angle_xpath_ast::SchemaType::DateTime)?;
            compare_atomics(&cast, right)
        }
        _ if left.is_numeric() || right.is_numeric() => {
            numeric_comparable(left)?;
            numeric_comparable(right)?;
            Ok(left.as_double().partial_cmp(&right.as_double()))
        }
        (Untyped(a) | String(a), Untyped(b) | String(b)) => Ok(Some(a.as_str().cmp(b.as_str()))),
        (a, b) => Err(Error::Type(format!(
            "cannot compare {} with {}",
            a.schema_type(),
            b.schema_type()
        ))),
    }
}

/// Equality as used by `unique` and map keys: value comparison where it is
/// defined, string comparison otherwise.
pub(crate) fn atomic_equal(left: &Atomic, right: &Atomic) -> bool {
    match compare_atomics(left, right) {
        Ok(ordering) => ordering == Some(Ordering::Equal),
        Err(_) => left.string_value() == right.string_value(),
    }
}

fn cast_bool(s: &str) -> Result<bool> {
    match s.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(Error::Cast {
            value: other.to_string(),
            target: "xs:boolean".to_string(),
        }),
    }
}

fn numeric_comparable(value: &Atomic) -> Result<()> {
    match value {
        Atomic::Integer(_) | Atomic::Decimal(_) | Atomic::Double(_) | Atomic::Untyped(_) => Ok(()),
        other => Err(Error::Type(format!(
            "cannot compare {} with a number",
            other.schema_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_types() {
        assert_eq!(
            compare_atomics(&Atomic::Integer(2), &Atomic::Double(2.0)).unwrap(),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare_atomics(&Atomic::Integer(1), &Atomic::Decimal("1.5".parse().unwrap()))
                .unwrap(),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn untyped_adapts_to_numbers() {
        assert_eq!(
            compare_atomics(&Atomic::Untyped("10".to_string()), &Atomic::Integer(2)).unwrap(),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn strings_compare_by_codepoint() {
        assert_eq!(
            compare_atomics(&Atomic::from("abc"), &Atomic::from("abd")).unwrap(),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn nan_is_incomparable() {
        assert_eq!(
            compare_atomics(&Atomic::Double(f64::NAN), &Atomic::Integer(1)).unwrap(),
            None
        );
    }

    #[test]
    fn typed_string_does_not_compare_with_number() {
        assert!(compare_atomics(&Atomic::from("1"), &Atomic::Integer(1)).is_err());
    }
}
