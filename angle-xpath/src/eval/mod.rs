//! The expression interpreter: one arm per AST variant.

mod axis;

use std::cmp::Ordering;
use std::rc::Rc;

use angle_xml::{Arena, Node, NodeKind, QName};
use angle_xpath_ast::{Axis, BinaryOp, Binding, Expr, KindTest, Occurrence, SchemaType};

use crate::atomic::{arithmetic, atomic_equal, compare_atomics, Atomic};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::item::Item;
use crate::sequence::{sorted_by_document_order, Sequence};

use axis::axis_nodes;

/// Evaluate an expression against a context.
pub fn eval(expr: &Expr, ctx: &Context) -> Result<Sequence> {
    match expr {
        Expr::Root => {
            let root = ctx.arena.borrow().root(ctx.node()?);
            Ok(Sequence::singleton(root))
        }
        Expr::Current => Ok(Sequence::singleton(ctx.item.clone())),
        Expr::Wildcard | Expr::Name(_) | Expr::Kind(_) => select_on_principal(expr, ctx),
        Expr::Attr(name) => {
            let arena = ctx.arena.borrow();
            let node = ctx.node()?;
            let matched: Vec<Node> = arena
                .attributes(node)
                .iter()
                .copied()
                .filter(|attr| arena.name(*attr).is_some_and(|n| name.matches(n)))
                .collect();
            Ok(Sequence::from_nodes(matched))
        }
        Expr::Step { curr, next } => {
            let input = eval(curr, ctx)?;
            let size = input.len();
            let mut out = Sequence::new();
            for (i, item) in input.iter().enumerate() {
                ctx.check_deadline()?;
                let sub = ctx.sub(item.clone(), i + 1, size);
                out.append(eval(next, &sub)?);
            }
            Ok(out)
        }
        Expr::Axis { axis, next } => {
            let node = ctx.node()?;
            let arena = ctx.arena.borrow();
            let principal = if *axis == Axis::Attribute {
                NodeKind::Attribute
            } else {
                NodeKind::Element
            };
            let mut matched = Vec::new();
            for candidate in axis_nodes(&arena, *axis, node) {
                if matches_test(&arena, next, candidate, principal)? {
                    matched.push(candidate);
                }
            }
            Ok(Sequence::from_nodes(matched))
        }
        Expr::Filter {
            expr: inner,
            predicate,
        } => {
            let input = eval(inner, ctx)?;
            let size = input.len();
            let mut out = Sequence::new();
            for (i, item) in input.iter().enumerate() {
                ctx.check_deadline()?;
                let sub = ctx.sub(item.clone(), i + 1, size);
                let result = eval(predicate, &sub)?;
                if predicate_holds(&result, i + 1)? {
                    out.push(item.clone());
                }
            }
            Ok(out)
        }
        Expr::Subscript { expr: inner, index } => {
            let input = eval(inner, ctx)?;
            let key = eval(index, ctx)?;
            subscript(&input, &key, ctx)
        }
        Expr::Union { left, right } => {
            let mut nodes = eval(left, ctx)?.nodes()?;
            nodes.extend(eval(right, ctx)?.nodes()?);
            let arena = ctx.arena.borrow();
            Ok(Sequence::from_nodes(sorted_by_document_order(nodes, &arena)))
        }
        Expr::Intersect { left, right } => {
            let keep = eval(right, ctx)?.nodes()?;
            let nodes: Vec<Node> = eval(left, ctx)?
                .nodes()?
                .into_iter()
                .filter(|n| keep.contains(n))
                .collect();
            let arena = ctx.arena.borrow();
            Ok(Sequence::from_nodes(sorted_by_document_order(nodes, &arena)))
        }
        Expr::Except { left, right } => {
            let drop = eval(right, ctx)?.nodes()?;
            let nodes: Vec<Node> = eval(left, ctx)?
                .nodes()?
                .into_iter()
                .filter(|n| !drop.contains(n))
                .collect();
            let arena = ctx.arena.borrow();
            Ok(Sequence::from_nodes(sorted_by_document_order(nodes, &arena)))
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
        Expr::Identity { left, right } => {
            let left = eval(left, ctx)?;
            let right = eval(right, ctx)?;
            if left.is_empty() || right.is_empty() {
                return Ok(Sequence::new());
            }
            let a = left.exactly_one()?.to_node()?;
            let b = right.exactly_one()?.to_node()?;
            Ok(Sequence::singleton(Atomic::Boolean(a == b)))
        }
        Expr::Reverse(inner) => {
            let value = eval(inner, ctx)?;
            let Some(item) = value.at_most_one()? else {
                return Ok(Sequence::new());
            };
            let negated = match item.atomized(&ctx.arena.borrow()) {
                Atomic::Integer(i) => match i.checked_neg() {
                    Some(n) => Atomic::Integer(n),
                    None => Atomic::Double(-(i as f64)),
                },
                Atomic::Decimal(d) => Atomic::Decimal(-d),
                Atomic::Double(d) => Atomic::Double(-d),
                other => Atomic::Double(-other.as_double()),
            };
            Ok(Sequence::singleton(negated))
        }
        Expr::Literal(s) => Ok(Sequence::singleton(Atomic::String(s.clone()))),
        Expr::Number(n) => Ok(Sequence::singleton(number_atomic(*n))),
        Expr::Boolean(b) => Ok(Sequence::singleton(Atomic::Boolean(*b))),
        Expr::Sequence(exprs) => {
            let mut out = Sequence::new();
            for expr in exprs {
                out.append(eval(expr, ctx)?);
            }
            Ok(out)
        }
        Expr::Array(exprs) => {
            let members = exprs
                .iter()
                .map(|e| eval(e, ctx))
                .collect::<Result<Vec<_>>>()?;
            Ok(Sequence::singleton(Atomic::Array(Rc::new(members))))
        }
        Expr::Map(entries) => {
            let mut pairs: Vec<(Atomic, Sequence)> = Vec::with_capacity(entries.len());
            for (key_expr, value_expr) in entries {
                let key_seq = eval(key_expr, ctx)?;
                let key = key_seq.exactly_one()?.atomized(&ctx.arena.borrow());
                let value = eval(value_expr, ctx)?;
                match pairs.iter_mut().find(|(k, _)| atomic_equal(k, &key)) {
                    Some(slot) => slot.1 = value,
                    None => pairs.push((key, value)),
                }
            }
            Ok(Sequence::singleton(Atomic::Map(Rc::new(pairs))))
        }
        Expr::Range { from, to } => {
            let from = eval(from, ctx)?;
            let to = eval(to, ctx)?;
            let (Some(from), Some(to)) = (from.at_most_one()?, to.at_most_one()?) else {
                return Ok(Sequence::new());
            };
            let arena = ctx.arena.borrow();
            let from = from.atomized(&arena).as_integer()?;
            let to = to.atomized(&arena).as_integer()?;
            drop(arena);
            Ok((from..=to).map(|i| Item::Atomic(Atomic::Integer(i))).collect())
        }
        Expr::Let { bindings, body } => {
            let scope = ctx.nest();
            for binding in bindings {
                let value = eval(&binding.expr, &scope)?;
                scope.variables.define(binding.name.clone(), value)?;
            }
            eval(body, &scope)
        }
        Expr::For { bindings, body } => {
            let mut out = Sequence::new();
            iterate_bindings(bindings, 0, ctx, &mut |ctx| {
                out.append(eval(body, ctx)?);
                Ok(true)
            })?;
            Ok(out)
        }
        Expr::Quantified {
            every,
            bindings,
            test,
        } => {
            let mut verdict = *every;
            iterate_bindings(bindings, 0, ctx, &mut |ctx| {
                let holds = eval(test, ctx)?.effective_boolean()?;
                if holds != *every {
                    verdict = holds;
                    return Ok(false);
                }
                Ok(true)
            })?;
            Ok(Sequence::singleton(Atomic::Boolean(verdict)))
        }
        Expr::If { test, then, alt } => {
            if eval(test, ctx)?.effective_boolean()? {
                eval(then, ctx)
            } else {
                eval(alt, ctx)
            }
        }
        Expr::Cast {
            expr: inner,
            target,
            allow_empty,
        } => {
            let value = eval(inner, ctx)?;
            let Some(item) = value.at_most_one()? else {
                if *allow_empty {
                    return Ok(Sequence::new());
                }
                return Err(Error::Type("cannot cast an empty sequence".to_string()));
            };
            let cast = item.atomized(&ctx.arena.borrow()).cast_to(*target)?;
            Ok(Sequence::singleton(cast))
        }
        Expr::Castable {
            expr: inner,
            target,
            allow_empty,
        } => {
            let value = eval(inner, ctx)?;
            let castable = match value.items() {
                [] => *allow_empty,
                [item] => item.atomized(&ctx.arena.borrow()).castable(*target),
                _ => false,
            };
            Ok(Sequence::singleton(Atomic::Boolean(castable)))
        }
        Expr::InstanceOf {
            expr: inner,
            types,
            occurrence,
        } => {
            let value = eval(inner, ctx)?;
            Ok(Sequence::singleton(Atomic::Boolean(instance_of(
                &value, types, *occurrence,
            ))))
        }
        Expr::Call { name, args } => {
            let function = ctx.registry.resolve(name, args.len())?;
            match function {
                Function::Builtin { call, .. } => call(ctx, args),
                Function::User { call, .. } => {
                    let call = call.clone();
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(eval(arg, ctx)?);
                    }
                    (*call)(ctx, values)
                }
            }
        }
        Expr::Variable(name) => ctx
            .variables
            .resolve(name)
            .ok_or_else(|| Error::Undefined(format!("variable ${}", name))),
    }
}

fn number_atomic(n: f64) -> Atomic {
    if n.fract() == 0.0 && n.abs() < 9e15 {
        Atomic::Integer(n as i64)
    } else {
        Atomic::Double(n)
    }
}

/// A name, wildcard or kind step selects from the focus along the
/// principal axis: children, or attributes when the context says so.
fn select_on_principal(test: &Expr, ctx: &Context) -> Result<Sequence> {
    let arena = ctx.arena.borrow();
    let node = ctx.node()?;
    let candidates: Vec<Node> = if ctx.principal == NodeKind::Attribute {
        arena.attributes(node).to_vec()
    } else {
        arena.children(node).to_vec()
    };
    let mut matched = Vec::new();
    for candidate in candidates {
        if matches_test(&arena, test, candidate, ctx.principal)? {
            matched.push(candidate);
        }
    }
    Ok(Sequence::from_nodes(matched))
}

/// Whether a candidate node passes a node test.
pub fn matches_test(
    arena: &Arena,
    test: &Expr,
    node: Node,
    principal: NodeKind,
) -> Result<bool> {
    match test {
        Expr::Wildcard => Ok(arena.kind(node) == principal),
        Expr::Name(name) => Ok(arena.kind(node) == principal
            && arena.name(node).is_some_and(|n| name.matches(n))),
        Expr::Kind(kind) => Ok(kind_matches(arena, kind, node)),
        other => Err(Error::Implemented(format!(
            "node test {} not supported here",
            other
        ))),
    }
}

fn kind_matches(arena: &Arena, kind: &KindTest, node: Node) -> bool {
    match kind {
        KindTest::Node => true,
        KindTest::Text => arena.kind(node) == NodeKind::Text,
        KindTest::Comment => arena.kind(node) == NodeKind::Comment,
        KindTest::Document => arena.kind(node) == NodeKind::Document,
        KindTest::Element(name) => {
            arena.kind(node) == NodeKind::Element && kind_name_matches(arena, name, node)
        }
        KindTest::Attribute(name) => {
            arena.kind(node) == NodeKind::Attribute && kind_name_matches(arena, name, node)
        }
        KindTest::ProcessingInstruction(target) => {
            arena.kind(node) == NodeKind::ProcessingInstruction
                && match target.as_deref() {
                    Some(t) => arena.local_name(node) == t,
                    None => true,
                }
        }
    }
}

fn kind_name_matches(arena: &Arena, name: &Option<QName>, node: Node) -> bool {
    match name {
        None => true,
        Some(name) => arena.name(node).is_some_and(|n| name.matches(n)),
    }
}

/// A predicate keeps the focus item either positionally (a single numeric
/// result equal to the position) or by effective boolean value.
fn predicate_holds(result: &Sequence, position: usize) -> Result<bool> {
    match result.items() {
        [Item::Atomic(a)] if a.is_numeric() => {
            Ok(a.as_integer().map(|n| n == position as i64).unwrap_or(false))
        }
        _ => result.effective_boolean(),
    }
}

fn subscript(input: &Sequence, key: &Sequence, ctx: &Context) -> Result<Sequence> {
    // indexing into an array or map value
    if let [Item::Atomic(collection)] = input.items() {
        match collection {
            Atomic::Array(members) => {
                let arena = ctx.arena.borrow();
                let index = key.exactly_one()?.atomized(&arena).as_integer()?;
                drop(arena);
                let member = usize::try_from(index - 1)
                    .ok()
                    .and_then(|i| members.get(i));
                return Ok(member.cloned().unwrap_or_default());
            }
            Atomic::Map(pairs) => {
                let arena = ctx.arena.borrow();
                let wanted = key.exactly_one()?.atomized(&arena);
                drop(arena);
                let value = pairs
                    .iter()
                    .find(|(k, _)| atomic_equal(k, &wanted))
                    .map(|(_, v)| v.clone());
                return Ok(value.unwrap_or_default());
            }
            _ => {}
        }
    }
    // plain positional subscript
    let arena = ctx.arena.borrow();
    let index = key.exactly_one()?.atomized(&arena).as_integer()?;
    drop(arena);
    let item = usize::try_from(index - 1)
        .ok()
        .and_then(|i| input.items().get(i));
    Ok(item.cloned().map(Sequence::from).unwrap_or_default())
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &Context) -> Result<Sequence> {
    match op {
        BinaryOp::Or => {
            let value = eval(left, ctx)?.effective_boolean()?
                || eval(right, ctx)?.effective_boolean()?;
            Ok(Sequence::singleton(Atomic::Boolean(value)))
        }
        BinaryOp::And => {
            let value = eval(left, ctx)?.effective_boolean()?
                && eval(right, ctx)?.effective_boolean()?;
            Ok(Sequence::singleton(Atomic::Boolean(value)))
        }
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            let arena = ctx.arena.borrow();
            let l = l.atomized(&arena);
            let r = r.atomized(&arena);
            drop(arena);
            // general comparison: true if any pair matches
            for a in &l {
                for b in &r {
                    if ordering_matches(op, compare_atomics(a, b)?) {
                        return Ok(Sequence::singleton(Atomic::Boolean(true)));
                    }
                }
            }
            Ok(Sequence::singleton(Atomic::Boolean(false)))
        }
        BinaryOp::ValueEq
        | BinaryOp::ValueNe
        | BinaryOp::ValueLt
        | BinaryOp::ValueLe
        | BinaryOp::ValueGt
        | BinaryOp::ValueGe => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            let arena = ctx.arena.borrow();
            let a = l.exactly_one()?.atomized(&arena);
            let b = r.exactly_one()?.atomized(&arena);
            drop(arena);
            let value = ordering_matches(value_to_general(op), compare_atomics(&a, &b)?);
            Ok(Sequence::singleton(Atomic::Boolean(value)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            let arena = ctx.arena.borrow();
            let l = l.atomized(&arena);
            let r = r.atomized(&arena);
            drop(arena);
            let mut out = Sequence::new();
            for a in &l {
                for b in &r {
                    out.push(arithmetic(op, a, b)?);
                }
            }
            Ok(out)
        }
        BinaryOp::Concat => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            let arena = ctx.arena.borrow();
            let value = format!("{}{}", l.string_value(&arena)?, r.string_value(&arena)?);
            Ok(Sequence::singleton(Atomic::String(value)))
        }
        BinaryOp::Precedes | BinaryOp::Follows => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            if l.is_empty() || r.is_empty() {
                return Ok(Sequence::new());
            }
            let a = l.exactly_one()?.to_node()?;
            let b = r.exactly_one()?.to_node()?;
            let ordering = ctx.arena.borrow().compare_document_order(a, b);
            let value = match op {
                BinaryOp::Precedes => ordering == Ordering::Less,
                _ => ordering == Ordering::Greater,
            };
            Ok(Sequence::singleton(Atomic::Boolean(value)))
        }
    }
}

fn value_to_general(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::ValueEq => BinaryOp::Eq,
        BinaryOp::ValueNe => BinaryOp::Ne,
        BinaryOp::ValueLt => BinaryOp::Lt,
        BinaryOp::ValueLe => BinaryOp::Le,
        BinaryOp::ValueGt => BinaryOp::Gt,
        BinaryOp::ValueGe => BinaryOp::Ge,
        other => other,
    }
}

fn ordering_matches(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    let Some(ordering) = ordering else {
        // NaN: only != holds
        return op == BinaryOp::Ne;
    };
    match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

fn instance_of(value: &Sequence, types: &[SchemaType], occurrence: Occurrence) -> bool {
    let n = value.len();
    let count_ok = match occurrence {
        Occurrence::One => n == 1,
        Occurrence::ZeroOrOne => n <= 1,
        Occurrence::ZeroOrMore => true,
        Occurrence::OneOrMore => n >= 1,
    };
    if !count_ok {
        return false;
    }
    value.iter().all(|item| {
        let item_type = match item {
            Item::Atomic(a) => a.schema_type(),
            // node content is untyped data
            Item::Node(_) => SchemaType::Untyped,
        };
        types.iter().any(|t| item_type.is_subtype_of(*t))
    })
}

/// Iterate the Cartesian product of the bindings in declaration order,
/// calling `body` once per combination; `body` returning false stops the
/// whole iteration.
fn iterate_bindings(
    bindings: &[Binding],
    index: usize,
    ctx: &Context,
    body: &mut dyn FnMut(&Context) -> Result<bool>,
) -> Result<bool> {
    if index == bindings.len() {
        return body(ctx);
    }
    let binding = &bindings[index];
    let items = eval(&binding.expr, ctx)?;
    for item in items {
        ctx.check_deadline()?;
        let scope = ctx.nest();
        scope
            .variables
            .define(binding.name.clone(), Sequence::from(item))?;
        if !iterate_bindings(bindings, index + 1, &scope, body)? {
            return Ok(false);
        }
    }
    Ok(true)
}
