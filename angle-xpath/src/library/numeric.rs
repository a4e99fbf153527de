use angle_xpath_ast::{BinaryOp, Expr};
use rust_decimal::{Decimal, RoundingStrategy};

use super::{arg, focus_or_arg, register_fn, string_arg};
use crate::atomic::{arithmetic, compare_atomics, Atomic};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::function::Registry;
use crate::sequence::Sequence;

pub(crate) fn register(registry: &mut Registry) {
    register_fn(registry, "number", 0, 1, fn_number);
    register_fn(registry, "sum", 1, 2, fn_sum);
    register_fn(registry, "count", 1, 1, fn_count);
    register_fn(registry, "avg", 1, 1, fn_avg);
    register_fn(registry, "min", 1, 1, fn_min);
    register_fn(registry, "max", 1, 1, fn_max);
    register_fn(registry, "round", 1, 1, fn_round);
    register_fn(registry, "floor", 1, 1, fn_floor);
    register_fn(registry, "ceiling", 1, 1, fn_ceiling);
    register_fn(registry, "abs", 1, 1, fn_abs);
    register_fn(registry, "format-integer", 2, 2, fn_format_integer);
    register_fn(registry, "format-number", 2, 2, fn_format_number);
}

fn fn_number(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let Some(item) = focus_or_arg(ctx, args, 0)? else {
        return Ok(Sequence::singleton(Atomic::Double(f64::NAN)));
    };
    let value = item.atomized(&ctx.arena.borrow()).as_double();
    Ok(Sequence::singleton(Atomic::Double(value)))
}

fn fn_sum(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let values = arg(ctx, args, 0)?;
    if values.is_empty() {
        if args.len() > 1 {
            return arg(ctx, args, 1);
        }
        return Ok(Sequence::singleton(Atomic::Integer(0)));
    }
    let arena = ctx.arena.borrow();
    let values = values.atomized(&arena);
    drop(arena);
    let mut total = values[0].clone();
    for value in &values[1..] {
        total = arithmetic(BinaryOp::Add, &total, value)?;
    }
    Ok(Sequence::singleton(total))
}

fn fn_count(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let count = arg(ctx, args, 0)?.len() as i64;
    Ok(Sequence::singleton(Atomic::Integer(count)))
}

fn fn_avg(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let values = arg(ctx, args, 0)?;
    if values.is_empty() {
        return Ok(Sequence::new());
    }
    let count = Atomic::Integer(values.len() as i64);
    let arena = ctx.arena.borrow();
    let values = values.atomized(&arena);
    drop(arena);
    let mut total = values[0].clone();
    for value in &values[1..] {
        total = arithmetic(BinaryOp::Add, &total, value)?;
    }
    let avg = arithmetic(BinaryOp::Div, &total, &count)?;
    Ok(Sequence::singleton(avg))
}

fn extremum(ctx: &Context, args: &[Expr], wanted: std::cmp::Ordering) -> Result<Sequence> {
    let values = arg(ctx, args, 0)?;
    let arena = ctx.arena.borrow();
    let values = values.atomized(&arena);
    drop(arena);
    let Some(mut best) = values.first().cloned() else {
        return Ok(Sequence::new());
    };
    for value in &values[1..] {
        if compare_atomics(value, &best)? == Some(wanted) {
            best = value.clone();
        }
    }
    Ok(Sequence::singleton(best))
}

fn fn_min(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    extremum(ctx, args, std::cmp::Ordering::Less)
}

fn fn_max(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    extremum(ctx, args, std::cmp::Ordering::Greater)
}

fn unary_numeric(
    ctx: &Context,
    args: &[Expr],
    int: fn(i64) -> i64,
    dec: fn(Decimal) -> Decimal,
    dbl: fn(f64) -> f64,
) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    let Some(item) = value.at_most_one()? else {
        return Ok(Sequence::new());
    };
    let result = match item.atomized(&ctx.arena.borrow()) {
        Atomic::Integer(i) => Atomic::Integer(int(i)),
        Atomic::Decimal(d) => Atomic::Decimal(dec(d)),
        other => Atomic::Double(dbl(other.as_double())),
    };
    Ok(Sequence::singleton(result))
}

fn fn_round(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    unary_numeric(
        ctx,
        args,
        |i| i,
        |d| d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        // ties round toward positive infinity
        |d| (d + 0.5).floor(),
    )
}

fn fn_floor(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    unary_numeric(ctx, args, |i| i, |d| d.floor(), |d| d.floor())
}

fn fn_ceiling(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    unary_numeric(ctx, args, |i| i, |d| d.ceil(), |d| d.ceil())
}

fn fn_abs(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    unary_numeric(ctx, args, |i| i.abs(), |d| d.abs(), |d| d.abs())
}

fn fn_format_integer(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    let picture = string_arg(ctx, args, 1)?;
    let Some(item) = value.at_most_one()? else {
        return Ok(Sequence::singleton(Atomic::from("")));
    };
    let n = item.atomized(&ctx.arena.borrow()).as_integer()?;
    Ok(Sequence::singleton(Atomic::String(format_integer(
        n, &picture,
    )?)))
}

fn format_integer(n: i64, picture: &str) -> Result<String> {
    match picture {
        "1" => Ok(n.to_string()),
        "a" => Ok(alphabetic(n)?.to_lowercase()),
        "A" => Ok(alphabetic(n)?),
        "i" => Ok(roman(n)?.to_lowercase()),
        "I" => Ok(roman(n)?),
        _ if picture.chars().all(|c| c == '0' || c == '1') => {
            let width = picture.len();
            let digits = n.unsigned_abs().to_string();
            let sign = if n < 0 { "-" } else { "" };
            Ok(format!("{}{}{}", sign, "0".repeat(width.saturating_sub(digits.len())), digits))
        }
        other => Err(Error::Implemented(format!(
            "format-integer picture '{}'",
            other
        ))),
    }
}

fn alphabetic(n: i64) -> Result<String> {
    if n < 1 {
        return Err(Error::Type("alphabetic formats start at 1".to_string()));
    }
    let mut n = n as u64;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn roman(n: i64) -> Result<String> {
    if !(1..=3999).contains(&n) {
        return Err(Error::Type("roman formats cover 1 to 3999".to_string()));
    }
    const NUMERALS: &[(i64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut n = n;
    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while n >= *value {
            out.push_str(numeral);
            n -= value;
        }
    }
    Ok(out)
}

fn fn_format_number(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    let picture = string_arg(ctx, args, 1)?;
    let Some(item) = value.at_most_one()? else {
        return Ok(Sequence::singleton(Atomic::from("NaN")));
    };
    let n = item.atomized(&ctx.arena.borrow()).as_double();
    Ok(Sequence::singleton(Atomic::String(format_number(
        n, &picture,
    )?)))
}

/// A working subset of the decimal-format picture: `0` and `#` digits,
/// `.` decimal point, `,` grouping in threes, a trailing `%`.
fn format_number(n: f64, picture: &str) -> Result<String> {
    if n.is_nan() {
        return Ok("NaN".to_string());
    }
    let percent = picture.ends_with('%');
    let picture = picture.trim_end_matches('%');
    let n = if percent { n * 100.0 } else { n };
    let (int_picture, frac_picture) = match picture.split_once('.') {
        Some((i, f)) => (i, f),
        None => (picture, ""),
    };
    let min_frac = frac_picture.chars().filter(|c| *c == '0').count();
    let max_frac = frac_picture.chars().filter(|c| *c == '0' || *c == '#').count();
    let min_int = int_picture.chars().filter(|c| *c == '0').count().max(1);
    let grouped = int_picture.contains(',');

    let negative = n < 0.0;
    let scale = 10f64.powi(max_frac as i32);
    let rounded = (n.abs() * scale).round() / scale;
    let int_part = rounded.trunc() as u64;
    let mut int_digits = int_part.to_string();
    if int_digits.len() < min_int {
        int_digits = format!("{}{}", "0".repeat(min_int - int_digits.len()), int_digits);
    }
    if grouped {
        int_digits = group_thousands(&int_digits);
    }
    let mut out = String::new();
    if negative && rounded != 0.0 {
        out.push('-');
    }
    out.push_str(&int_digits);
    if max_frac > 0 {
        let mut frac = format!("{:.*}", max_frac, rounded.fract());
        // "0.xxxx" -> digits after the point
        let mut digits = frac.split_off(2);
        while digits.len() > min_frac && digits.ends_with('0') {
            digits.pop();
        }
        if !digits.is_empty() {
            out.push('.');
            out.push_str(&digits);
        }
    }
    if percent {
        out.push('%');
    }
    Ok(out)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = digits.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roman_numerals() {
        assert_eq!(roman(1987).unwrap(), "MCMLXXXVII");
        assert_eq!(roman(4).unwrap(), "IV");
        assert!(roman(0).is_err());
    }

    #[test]
    fn alphabetic_sequences() {
        assert_eq!(alphabetic(1).unwrap(), "A");
        assert_eq!(alphabetic(26).unwrap(), "Z");
        assert_eq!(alphabetic(27).unwrap(), "AA");
    }

    #[test]
    fn zero_padded_integers() {
        assert_eq!(format_integer(42, "0001").unwrap(), "0042");
        assert_eq!(format_integer(-7, "001").unwrap(), "-007");
    }

    #[test]
    fn number_pictures() {
        assert_eq!(format_number(1234.5, "#,##0.00").unwrap(), "1,234.50");
        assert_eq!(format_number(0.25, "0%").unwrap(), "25%");
        assert_eq!(format_number(2.0, "0.##").unwrap(), "2");
        assert_eq!(format_number(-3.0, "0").unwrap(), "-3");
    }
}
