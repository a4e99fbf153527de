//! Arithmetic over atomics with promotion to the lowest common numeric
//! type: integer, then decimal, then double.

use angle_xpath_ast::BinaryOp;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{parse_double, Atomic};
use crate::error::{Error, Result};

enum Numeric {
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
}

fn to_numeric(value: &Atomic) -> Result<Numeric> {
    match value {
        Atomic::Integer(i) => Ok(Numeric::Integer(*i)),
        Atomic::Decimal(d) => Ok(Numeric::Decimal(*d)),
        Atomic::Double(d) => Ok(Numeric::Double(*d)),
        Atomic::Untyped(s) => parse_double(s).map(Numeric::Double).ok_or(Error::Cast {
            value: s.clone(),
            target: "xs:double".to_string(),
        }),
        other => Err(Error::Type(format!(
            "{} is not a number",
            other.schema_type()
        ))),
    }
}

pub(crate) fn arithmetic(op: BinaryOp, left: &Atomic, right: &Atomic) -> Result<Atomic> {
    let left = to_numeric(left)?;
    let right = to_numeric(right)?;
    match (left, right) {
        (Numeric::Integer(a), Numeric::Integer(b)) => integer_op(op, a, b),
        (Numeric::Double(a), b) => double_op(op, a, widen(b)),
        (a, Numeric::Double(b)) => double_op(op, widen(a), b),
        (Numeric::Decimal(a), Numeric::Integer(b)) => decimal_op(op, a, Decimal::from(b)),
        (Numeric::Integer(a), Numeric::Decimal(b)) => decimal_op(op, Decimal::from(a), b),
        (Numeric::Decimal(a), Numeric::Decimal(b)) => decimal_op(op, a, b),
    }
}

fn widen(n: Numeric) -> f64 {
    match n {
        Numeric::Integer(i) => i as f64,
        Numeric::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        Numeric::Double(d) => d,
    }
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> Result<Atomic> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(Error::ZeroDivision);
            }
            // exact division stays an integer, otherwise fall to double
            if a % b == 0 {
                Some(a / b)
            } else {
                return Ok(Atomic::Double(a as f64 / b as f64));
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(Error::ZeroDivision);
            }
            Some(a % b)
        }
        _ => return Err(Error::Type(format!("{} is not arithmetic", op.symbol()))),
    };
    match result {
        Some(value) => Ok(Atomic::Integer(value)),
        // overflow falls back to double arithmetic
        None => double_op(op, a as f64, b as f64),
    }
}

fn decimal_op(op: BinaryOp, a: Decimal, b: Decimal) -> Result<Atomic> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b.is_zero() {
                return Err(Error::ZeroDivision);
            }
            a.checked_div(b)
        }
        BinaryOp::Mod => {
            if b.is_zero() {
                return Err(Error::ZeroDivision);
            }
            a.checked_rem(b)
        }
        _ => return Err(Error::Type(format!("{} is not arithmetic", op.symbol()))),
    };
    match result {
        Some(value) => Ok(Atomic::Decimal(value)),
        None => double_op(op, a.to_f64().unwrap_or(f64::NAN), b.to_f64().unwrap_or(f64::NAN)),
    }
}

fn double_op(op: BinaryOp, a: f64, b: f64) -> Result<Atomic> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(Error::ZeroDivision);
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(Error::ZeroDivision);
            }
            a % b
        }
        _ => return Err(Error::Type(format!("{} is not arithmetic", op.symbol()))),
    };
    Ok(Atomic::Double(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_stays_integer() {
        assert_eq!(
            arithmetic(BinaryOp::Add, &Atomic::Integer(1), &Atomic::Integer(2)).unwrap(),
            Atomic::Integer(3)
        );
        assert_eq!(
            arithmetic(BinaryOp::Div, &Atomic::Integer(12), &Atomic::Integer(3)).unwrap(),
            Atomic::Integer(4)
        );
    }

    #[test]
    fn uneven_division_promotes() {
        assert_eq!(
            arithmetic(BinaryOp::Div, &Atomic::Integer(1), &Atomic::Integer(2)).unwrap(),
            Atomic::Double(0.5)
        );
    }

    #[test]
    fn division_by_zero_fails() {
        assert_eq!(
            arithmetic(BinaryOp::Div, &Atomic::Integer(1), &Atomic::Integer(0)),
            Err(Error::ZeroDivision)
        );
        assert_eq!(
            arithmetic(BinaryOp::Mod, &Atomic::Double(1.0), &Atomic::Double(0.0)),
            Err(Error::ZeroDivision)
        );
    }

    #[test]
    fn untyped_is_promoted_through_double() {
        assert_eq!(
            arithmetic(
                BinaryOp::Add,
                &Atomic::Untyped("1".to_string()),
                &Atomic::Integer(2)
            )
            .unwrap(),
            Atomic::Double(3.0)
        );
    }

    #[test]
    fn strings_do_not_add() {
        assert!(arithmetic(BinaryOp::Add, &Atomic::from("a"), &Atomic::Integer(1)).is_err());
    }

    #[test]
    fn overflow_falls_back_to_double() {
        let result =
            arithmetic(BinaryOp::Mul, &Atomic::Integer(i64::MAX), &Atomic::Integer(2)).unwrap();
        assert!(matches!(result, Atomic::Double(_)));
    }
}
