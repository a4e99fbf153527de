use angle_xpath_ast::Expr;

use super::{arg, register_fn};
use crate::atomic::Atomic;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::function::Registry;
use crate::sequence::Sequence;

pub(crate) fn register(registry: &mut Registry) {
    register_fn(registry, "empty", 1, 1, fn_empty);
    register_fn(registry, "exists", 1, 1, fn_exists);
    register_fn(registry, "head", 1, 1, fn_head);
    register_fn(registry, "tail", 1, 1, fn_tail);
    register_fn(registry, "reverse", 1, 1, fn_reverse);
    register_fn(registry, "distinct-values", 1, 1, fn_distinct_values);
    register_fn(registry, "zero-or-one", 1, 1, fn_zero_or_one);
    register_fn(registry, "one-or-more", 1, 1, fn_one_or_more);
    register_fn(registry, "exactly-one", 1, 1, fn_exactly_one);
}

fn fn_empty(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    Ok(Sequence::singleton(Atomic::Boolean(value.is_empty())))
}

fn fn_exists(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    Ok(Sequence::singleton(Atomic::Boolean(!value.is_empty())))
}

fn fn_head(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    Ok(value
        .first()
        .cloned()
        .map(Sequence::from)
        .unwrap_or_default())
}

fn fn_tail(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    Ok(value.items().iter().skip(1).cloned().collect())
}

fn fn_reverse(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    Ok(value.items().iter().rev().cloned().collect())
}

fn fn_distinct_values(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    Ok(value.unique())
}

fn fn_zero_or_one(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    if value.len() > 1 {
        return Err(Error::Type(format!(
            "zero-or-one got {} items",
            value.len()
        )));
    }
    Ok(value)
}

fn fn_one_or_more(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    if value.is_empty() {
        return Err(Error::Type("one-or-more got an empty sequence".to_string()));
    }
    Ok(value)
}

fn fn_exactly_one(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?;
    if value.len() != 1 {
        return Err(Error::Type(format!(
            "exactly-one got {} items",
            value.len()
        )));
    }
    Ok(value)
}
