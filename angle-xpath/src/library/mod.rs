//! The builtin function library, one module per family.
//!
//! Builtins receive their argument expressions unevaluated; the helpers
//! below evaluate them against the calling context. Arity has already been
//! checked by the registry.

mod boolean;
mod context;
mod node;
mod numeric;
mod sequence;
mod string;

use angle_xml::FN_NAMESPACE;
use angle_xpath_ast::Expr;

use crate::context::Context;
use crate::error::Result;
use crate::function::{BuiltinFn, Registry};
use crate::item::Item;
use crate::sequence::Sequence;

pub(crate) fn register(registry: &mut Registry) {
    boolean::register(registry);
    context::register(registry);
    node::register(registry);
    numeric::register(registry);
    sequence::register(registry);
    string::register(registry);
}

pub(crate) fn register_fn(
    registry: &mut Registry,
    local: &str,
    min: usize,
    max: usize,
    call: BuiltinFn,
) {
    registry.register_builtin(FN_NAMESPACE, local, min, max, call);
}

/// Evaluate one argument.
pub(crate) fn arg(ctx: &Context, args: &[Expr], index: usize) -> Result<Sequence> {
    crate::eval::eval(&args[index], ctx)
}

/// Argument as a string: the string value of an empty-or-singleton result.
pub(crate) fn string_arg(ctx: &Context, args: &[Expr], index: usize) -> Result<String> {
    let value = arg(ctx, args, index)?;
    let arena = ctx.arena.borrow();
    value.string_value(&arena)
}

/// The item an optional node argument designates, the focus otherwise.
pub(crate) fn focus_or_arg(ctx: &Context, args: &[Expr], index: usize) -> Result<Option<Item>> {
    if args.len() > index {
        Ok(arg(ctx, args, index)?.at_most_one()?.cloned())
    } else {
        Ok(Some(ctx.item.clone()))
    }
}
