use angle_xpath_ast::Expr;

use super::{arg, register_fn};
use crate::atomic::Atomic;
use crate::context::Context;
use crate::error::Result;
use crate::function::Registry;
use crate::sequence::Sequence;

pub(crate) fn register(registry: &mut Registry) {
    register_fn(registry, "true", 0, 0, fn_true);
    register_fn(registry, "false", 0, 0, fn_false);
    register_fn(registry, "boolean", 1, 1, fn_boolean);
    register_fn(registry, "not", 1, 1, fn_not);
}

fn fn_true(_ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    Ok(Sequence::singleton(Atomic::Boolean(true)))
}

fn fn_false(_ctx: &Context, _args: &[Expr]) -> Result<Sequence> {
    Ok(Sequence::singleton(Atomic::Boolean(false)))
}

fn fn_boolean(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?.effective_boolean()?;
    Ok(Sequence::singleton(Atomic::Boolean(value)))
}

fn fn_not(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let value = arg(ctx, args, 0)?.effective_boolean()?;
    Ok(Sequence::singleton(Atomic::Boolean(!value)))
}
