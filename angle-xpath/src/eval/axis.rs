//! Axis traversal over the arena.

use angle_xml::{Arena, Node};
use angle_xpath_ast::Axis;

use std::cmp::Ordering;

/// The nodes reached from `focus` along `axis`, in document order.
///
/// `self`, `ancestor-or-self` and `descendant-or-self` include the focus
/// exactly once. `preceding` and `following` skip the ancestor chain and
/// the subtree of the focus respectively; neither visits attributes. The
/// namespace axis is not modelled and yields nothing.
pub(crate) fn axis_nodes(arena: &Arena, axis: Axis, focus: Node) -> Vec<Node> {
    match axis {
        Axis::Child => arena.children(focus).to_vec(),
        Axis::Parent => arena.parent(focus).into_iter().collect(),
        Axis::SelfAxis => vec![focus],
        Axis::Ancestor => ancestors(arena, focus),
        Axis::AncestorOrSelf => {
            let mut nodes = ancestors(arena, focus);
            nodes.push(focus);
            nodes
        }
        Axis::Descendant => arena.descendants(focus),
        Axis::DescendantOrSelf => {
            let mut nodes = vec![focus];
            nodes.extend(arena.descendants(focus));
            nodes
        }
        Axis::PrecedingSibling => siblings(arena, focus, Ordering::Less),
        Axis::FollowingSibling => siblings(arena, focus, Ordering::Greater),
        Axis::Preceding => {
            let root = arena.root(focus);
            let mut nodes = vec![root];
            nodes.extend(arena.descendants(root));
            nodes.retain(|n| {
                arena.compare_document_order(*n, focus) == Ordering::Less
                    && !arena.is_ancestor_or_self(*n, focus)
            });
            nodes
        }
        Axis::Following => {
            let root = arena.root(focus);
            let mut nodes = arena.descendants(root);
            nodes.retain(|n| {
                arena.compare_document_order(*n, focus) == Ordering::Greater
                    && !arena.is_ancestor_or_self(focus, *n)
            });
            nodes
        }
        Axis::Attribute => arena.attributes(focus).to_vec(),
        Axis::Namespace => Vec::new(),
    }
}

fn ancestors(arena: &Arena, focus: Node) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut current = arena.parent(focus);
    while let Some(node) = current {
        nodes.push(node);
        current = arena.parent(node);
    }
    nodes.reverse();
    nodes
}

fn siblings(arena: &Arena, focus: Node, side: Ordering) -> Vec<Node> {
    let Some(parent) = arena.parent(focus) else {
        return Vec::new();
    };
    let position = arena.position(focus);
    arena
        .children(parent)
        .iter()
        .copied()
        .filter(|sibling| {
            let at = arena.position(*sibling);
            at.cmp(&position) == side
        })
        .collect()
}
