use angle_xpath_ast::Expr;
use regex::Regex;

use super::{arg, focus_or_arg, register_fn, string_arg};
use crate::atomic::Atomic;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::function::Registry;
use crate::item::Item;
use crate::sequence::Sequence;

// concat() accepts any reasonable arity
const MAX_CONCAT_ARITY: usize = 99;

pub(crate) fn register(registry: &mut Registry) {
    register_fn(registry, "string", 0, 1, fn_string);
    register_fn(registry, "string-length", 0, 1, fn_string_length);
    register_fn(registry, "normalize-space", 0, 1, fn_normalize_space);
    register_fn(registry, "upper-case", 1, 1, fn_upper_case);
    register_fn(registry, "lower-case", 1, 1, fn_lower_case);
    register_fn(registry, "starts-with", 2, 2, fn_starts_with);
    register_fn(registry, "ends-with", 2, 2, fn_ends_with);
    register_fn(registry, "contains", 2, 2, fn_contains);
    register_fn(registry, "substring", 2, 3, fn_substring);
    register_fn(registry, "substring-before", 2, 2, fn_substring_before);
    register_fn(registry, "substring-after", 2, 2, fn_substring_after);
    register_fn(registry, "string-join", 1, 2, fn_string_join);
    register_fn(registry, "concat", 2, MAX_CONCAT_ARITY, fn_concat);
    register_fn(registry, "replace", 3, 4, fn_replace);
    register_fn(registry, "translate", 3, 3, fn_translate);
    register_fn(registry, "matches", 2, 3, fn_matches);
    register_fn(registry, "tokenize", 1, 3, fn_tokenize);
    register_fn(registry, "compare", 2, 2, fn_compare);
}

fn focus_string(ctx: &Context, args: &[Expr], index: usize) -> Result<String> {
    let Some(item) = focus_or_arg(ctx, args, index)? else {
        return Ok(String::new());
    };
    Ok(item.string_value(&ctx.arena.borrow()))
}

fn fn_string(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = focus_string(ctx, args, 0)?;
    Ok(Sequence::singleton(Atomic::String(value)))
}

fn fn_string_length(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = focus_string(ctx, args, 0)?;
    Ok(Sequence::singleton(Atomic::Integer(
        value.chars().count() as i64
    )))
}

fn fn_normalize_space(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = focus_string(ctx, args, 0)?;
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(Sequence::singleton(Atomic::String(normalized)))
}

fn fn_upper_case(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = string_arg(ctx, args, 0)?;
    Ok(Sequence::singleton(Atomic::String(value.to_uppercase())))
}

fn fn_lower_case(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = string_arg(ctx, args, 0)?;
    Ok(Sequence::singleton(Atomic::String(value.to_lowercase())))
}

fn fn_starts_with(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let haystack = string_arg(ctx, args, 0)?;
    let needle = string_arg(ctx, args, 1)?;
    Ok(Sequence::singleton(Atomic::Boolean(
        haystack.starts_with(&needle),
    )))
}

fn fn_ends_with(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let haystack = string_arg(ctx, args, 0)?;
    let needle = string_arg(ctx, args, 1)?;
    Ok(Sequence::singleton(Atomic::Boolean(
        haystack.ends_with(&needle),
    )))
}

fn fn_contains(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let haystack = string_arg(ctx, args, 0)?;
    let needle = string_arg(ctx, args, 1)?;
    Ok(Sequence::singleton(Atomic::Boolean(
        haystack.contains(&needle),
    )))
}

/// 1-based, fractional positions round, length counts characters.
fn fn_substring(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = string_arg(ctx, args, 0)?;
    let start = arg(ctx, args, 1)?;
    let length = if args.len() > 2 {
        Some(arg(ctx, args, 2)?)
    } else {
        None
    };
    let arena = ctx.arena.borrow();
    let start = start
        .at_most_one()?
        .map(|i| i.atomized(&arena).as_double())
        .unwrap_or(f64::NAN);
    let length = match &length {
        Some(length) => length
            .at_most_one()?
            .map(|i| i.atomized(&arena).as_double())
            .unwrap_or(f64::NAN),
        None => f64::INFINITY,
    };
    drop(arena);
    if start.is_nan() || length.is_nan() {
        return Ok(Sequence::singleton(Atomic::from("")));
    }
    let start = (start + 0.5).floor();
    let end = if length.is_infinite() {
        f64::INFINITY
    } else {
        start + (length + 0.5).floor()
    };
    let out: String = value
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let at = (*i + 1) as f64;
            at >= start && at < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(Sequence::singleton(Atomic::String(out)))
}

fn fn_substring_before(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let haystack = string_arg(ctx, args, 0)?;
    let needle = string_arg(ctx, args, 1)?;
    let out = haystack
        .split_once(&needle)
        .map(|(before, _)| before.to_string())
        .unwrap_or_default();
    Ok(Sequence::singleton(Atomic::String(out)))
}

fn fn_substring_after(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let haystack = string_arg(ctx, args, 0)?;
    let needle = string_arg(ctx, args, 1)?;
    let out = haystack
        .split_once(&needle)
        .map(|(_, after)| after.to_string())
        .unwrap_or_default();
    Ok(Sequence::singleton(Atomic::String(out)))
}

fn fn_string_join(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let values = arg(ctx, args, 0)?;
    let separator = if args.len() > 1 {
        string_arg(ctx, args, 1)?
    } else {
        String::new()
    };
    let arena = ctx.arena.borrow();
    let joined = values.string_values(&arena).join(&separator);
    Ok(Sequence::singleton(Atomic::String(joined)))
}

fn fn_concat(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let mut out = String::new();
    for index in 0..args.len() {
        out.push_str(&string_arg(ctx, args, index)?);
    }
    Ok(Sequence::singleton(Atomic::String(out)))
}

/// XPath regex flags `i`, `s`, `m`, `x` translate directly.
fn compile_regex(pattern: &str, flags: &str) -> Result<Regex> {
    for flag in flags.chars() {
        if !matches!(flag, 'i' | 's' | 'm' | 'x') {
            return Err(Error::Type(format!("unsupported regex flag '{}'", flag)));
        }
    }
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Regex::new(&source).map_err(|e| Error::Type(format!("invalid regular expression: {}", e)))
}

fn fn_replace(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = string_arg(ctx, args, 0)?;
    let pattern = string_arg(ctx, args, 1)?;
    let replacement = string_arg(ctx, args, 2)?;
    let flags = if args.len() > 3 {
        string_arg(ctx, args, 3)?
    } else {
        String::new()
    };
    let regex = compile_regex(&pattern, &flags)?;
    let out = regex.replace_all(&value, replacement.as_str()).into_owned();
    Ok(Sequence::singleton(Atomic::String(out)))
}

fn fn_translate(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = string_arg(ctx, args, 0)?;
    let from: Vec<char> = string_arg(ctx, args, 1)?.chars().collect();
    let to: Vec<char> = string_arg(ctx, args, 2)?.chars().collect();
    let out: String = value
        .chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(Sequence::singleton(Atomic::String(out)))
}

fn fn_matches(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = string_arg(ctx, args, 0)?;
    let pattern = string_arg(ctx, args, 1)?;
    let flags = if args.len() > 2 {
        string_arg(ctx, args, 2)?
    } else {
        String::new()
    };
    let regex = compile_regex(&pattern, &flags)?;
    Ok(Sequence::singleton(Atomic::Boolean(regex.is_match(&value))))
}

fn fn_tokenize(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = string_arg(ctx, args, 0)?;
    if args.len() == 1 {
        // single-argument form splits on whitespace
        return Ok(value
            .split_whitespace()
            .map(|token| Item::Atomic(Atomic::from(token)))
            .collect());
    }
    let pattern = string_arg(ctx, args, 1)?;
    let flags = if args.len() > 2 {
        string_arg(ctx, args, 2)?
    } else {
        String::new()
    };
    let regex = compile_regex(&pattern, &flags)?;
    Ok(regex
        .split(&value)
        .map(|token| Item::Atomic(Atomic::from(token)))
        .collect())
}

fn fn_compare(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let a = string_arg(ctx, args, 0)?;
    let b = string_arg(ctx, args, 1)?;
    let ordering = match a.cmp(&b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    Ok(Sequence::singleton(Atomic::Integer(ordering)))
}
