use angle_xml::{NodeKind, XML_NAMESPACE};
use angle_xpath_ast::Expr;

use super::{arg, focus_or_arg, register_fn, string_arg};
use crate::atomic::Atomic;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::function::Registry;
use crate::item::Item;
use crate::sequence::Sequence;

pub(crate) fn register(registry: &mut Registry) {
    register_fn(registry, "name", 0, 1, fn_name);
    register_fn(registry, "local-name", 0, 1, fn_local_name);
    register_fn(registry, "namespace-uri", 0, 1, fn_namespace_uri);
    register_fn(registry, "root", 0, 1, fn_root);
    register_fn(registry, "path", 0, 1, fn_path);
    register_fn(registry, "has-children", 0, 1, fn_has_children);
    register_fn(registry, "lang", 1, 2, fn_lang);
    register_fn(registry, "node-before", 2, 2, fn_node_before);
    register_fn(registry, "node-after", 2, 2, fn_node_after);
    register_fn(registry, "is-same-node", 2, 2, fn_is_same_node);
}

fn node_of(item: Option<Item>) -> Result<Option<angle_xml::Node>> {
    match item {
        None => Ok(None),
        Some(item) => item.to_node().map(Some),
    }
}

fn fn_name(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let Some(node) = node_of(focus_or_arg(ctx, args, 0)?)? else {
        return Ok(Sequence::singleton(Atomic::from("")));
    };
    let name = ctx.arena.borrow().qualified_name(node);
    Ok(Sequence::singleton(Atomic::String(name)))
}

fn fn_local_name(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let Some(node) = node_of(focus_or_arg(ctx, args, 0)?)? else {
        return Ok(Sequence::singleton(Atomic::from("")));
    };
    let name = ctx.arena.borrow().local_name(node).to_string();
    Ok(Sequence::singleton(Atomic::String(name)))
}

fn fn_namespace_uri(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let Some(node) = node_of(focus_or_arg(ctx, args, 0)?)? else {
        return Ok(Sequence::singleton(Atomic::from("")));
    };
    let arena = ctx.arena.borrow();
    let uri = arena
        .name(node)
        .and_then(|n| n.uri.clone())
        .unwrap_or_default();
    Ok(Sequence::singleton(Atomic::String(uri)))
}

fn fn_root(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let Some(node) = node_of(focus_or_arg(ctx, args, 0)?)? else {
        return Ok(Sequence::new());
    };
    let root = ctx.arena.borrow().root(node);
    Ok(Sequence::singleton(root))
}

/// A rooted path with positional steps, `/root/item[2]/@id` style.
fn fn_path(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let Some(node) = node_of(focus_or_arg(ctx, args, 0)?)? else {
        return Ok(Sequence::new());
    };
    let arena = ctx.arena.borrow();
    let mut chain = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        chain.push(n);
        current = arena.parent(n);
    }
    chain.reverse();
    let mut path = String::new();
    for step in chain {
        match arena.kind(step) {
            NodeKind::Document => {}
            NodeKind::Attribute => {
                path.push_str("/@");
                path.push_str(&arena.qualified_name(step));
            }
            NodeKind::Element => {
                let mut index = 1;
                if let Some(parent) = arena.parent(step) {
                    let name = arena.name(step).cloned();
                    index = arena
                        .children(parent)
                        .iter()
                        .take_while(|sibling| **sibling != step)
                        .filter(|sibling| arena.name(**sibling).cloned() == name)
                        .count()
                        + 1;
                }
                path.push('/');
                path.push_str(&arena.qualified_name(step));
                path.push_str(&format!("[{}]", index));
            }
            NodeKind::Text => path.push_str("/text()"),
            NodeKind::Comment => path.push_str("/comment()"),
            NodeKind::ProcessingInstruction => {
                path.push_str(&format!("/processing-instruction({})", arena.local_name(step)))
            }
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    Ok(Sequence::singleton(Atomic::String(path)))
}

fn fn_has_children(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let Some(node) = node_of(focus_or_arg(ctx, args, 0)?)? else {
        return Ok(Sequence::singleton(Atomic::Boolean(false)));
    };
    let value = !ctx.arena.borrow().is_leaf(node);
    Ok(Sequence::singleton(Atomic::Boolean(value)))
}

/// `xml:lang` test on the nearest carrying ancestor.
fn fn_lang(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let wanted = string_arg(ctx, args, 0)?;
    let Some(node) = node_of(focus_or_arg(ctx, args, 1)?)? else {
        return Ok(Sequence::singleton(Atomic::Boolean(false)));
    };
    let arena = ctx.arena.borrow();
    let lang_name = angle_xml::QName::qualified("lang", "xml", XML_NAMESPACE);
    let mut current = Some(node);
    while let Some(n) = current {
        if let Some(lang) = arena.attribute_value(n, &lang_name) {
            let lang = lang.to_ascii_lowercase();
            let wanted = wanted.to_ascii_lowercase();
            let matched = lang == wanted
                || lang
                    .strip_prefix(wanted.as_str())
                    .is_some_and(|rest| rest.starts_with('-'));
            return Ok(Sequence::singleton(Atomic::Boolean(matched)));
        }
        current = arena.parent(n);
    }
    Ok(Sequence::singleton(Atomic::Boolean(false)))
}

fn two_nodes(ctx: &Context, args: &[Expr]) -> Result<(angle_xml::Node, angle_xml::Node)> {
    let a = arg(ctx, args, 0)?;
    let b = arg(ctx, args, 1)?;
    let a = a
        .exactly_one()
        .map_err(|_| Error::Node("expected a single node".to_string()))?
        .to_node()?;
    let b = b
        .exactly_one()
        .map_err(|_| Error::Node("expected a single node".to_string()))?
        .to_node()?;
    Ok((a, b))
}

fn fn_node_before(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let (a, b) = two_nodes(ctx, args)?;
    let value = ctx.arena.borrow().compare_document_order(a, b) == std::cmp::Ordering::Less;
    Ok(Sequence::singleton(Atomic::Boolean(value)))
}

fn fn_node_after(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let (a, b) = two_nodes(ctx, args)?;
    let value = ctx.arena.borrow().compare_document_order(a, b) == std::cmp::Ordering::Greater;
    Ok(Sequence::singleton(Atomic::Boolean(value)))
}

fn fn_is_same_node(ctx: &Context, args: &[Expr]) -> Result<Sequence> {
    let (a, b) = two_nodes(ctx, args)?;
    Ok(Sequence::singleton(Atomic::Boolean(a == b)))
}
