//! Focus- and driver-dependent functions: position, last, the XSLT
//! current-* family, and the clock readings.
//!
//! The XSLT driver communicates the current template node, the active
//! group and the merge state through hidden variables (see
//! [`crate::context::hidden_name`]); the functions here just read them.

use angle_xpath_ast::Expr;

use super::{register_fn, string_arg};
use crate::atomic::Atomic;
use crate::context::{hidden_name, Context};
use crate::error::{Error, Result};
use crate::function::Registry;
use crate::sequence::Sequence;

pub(crate) fn register(registry: &mut Registry) {
    register_fn(registry, "position", 0, 0, fn_position);
    register_fn(registry, "last", 0, 0, fn_last);
    register_fn(registry, "current", 0, 0, fn_current);
    register_fn(registry, "current-group", 0, 0, fn_current_group);
    register_fn(registry, "current-grouping-key", 0, 0, fn_current_grouping_key);
    register_fn(registry, "current-merge-group", 0, 1, fn_current_merge_group);
    register_fn(registry, "current-merge-key", 0, 0, fn_current_merge_key);
    register_fn(registry, "current-date", 0, 0, fn_current_date);
    register_fn(registry, "current-dateTime", 0, 0, fn_current_datetime);
}

fn fn_position(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    Ok(Sequence::singleton(Atomic::Integer(ctx.position as i64)))
}

fn fn_last(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    Ok(Sequence::singleton(Atomic::Integer(ctx.size as i64)))
}

fn fn_current(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    match ctx.variables.resolve(&hidden_name("current")) {
        Some(current) => Ok(current),
        None => Ok(Sequence::singleton(ctx.item.clone())),
    }
}

fn fn_current_group(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    ctx.variables
        .resolve(&hidden_name("current-group"))
        .ok_or_else(|| Error::Undefined("current-group outside for-each-group".to_string()))
}

fn fn_current_grouping_key(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    ctx.variables
        .resolve(&hidden_name("current-grouping-key"))
        .ok_or_else(|| Error::Undefined("current-grouping-key outside for-each-group".to_string()))
}

fn fn_current_merge_group(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let name = if args.is_empty() {
        hidden_name("current-merge-group")
    } else {
        let source = string_arg(ctx, args, 0)?;
        hidden_name(&format!("current-merge-group:{}", source))
    };
    ctx.variables
        .resolve(&name)
        .ok_or_else(|| Error::Undefined("current-merge-group outside merge".to_string()))
}

fn fn_current_merge_key(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    ctx.variables
        .resolve(&hidden_name("current-merge-key"))
        .ok_or_else(|| Error::Undefined("current-merge-key outside merge".to_string()))
}

fn fn_current_date(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    Ok(Sequence::singleton(Atomic::Date(ctx.now.date_naive())))
}

fn fn_current_datetime(ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    Ok(Sequence::singleton(Atomic::DateTime(ctx.now)))
}
