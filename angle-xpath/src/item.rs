use angle_xml::{Arena, Node};

use crate::atomic::Atomic;
use crate::error::{Error, Result};

/// One item of a sequence: an atomic value or a node handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Atomic(Atomic),
    Node(Node),
}

impl Item {
    pub fn is_atomic(&self) -> bool {
        matches!(self, Item::Atomic(_))
    }

    pub fn to_atomic(&self) -> Result<Atomic> {
        match self {
            Item::Atomic(a) => Ok(a.clone()),
            Item::Node(_) => Err(Error::Node("expected an atomic value, got a node".to_string())),
        }
    }

    pub fn to_node(&self) -> Result<Node> {
        match self {
            Item::Node(n) => Ok(*n),
            Item::Atomic(a) => Err(Error::Node(format!(
                "expected a node, got {}",
                a.schema_type()
            ))),
        }
    }

    /// Atomization: nodes become untyped data carrying their string value.
    pub fn atomized(&self, arena: &Arena) -> Atomic {
        match self {
            Item::Atomic(a) => a.clone(),
            Item::Node(n) => Atomic::Untyped(arena.string_value(*n)),
        }
    }

    pub fn string_value(&self, arena: &Arena) -> String {
        match self {
            Item::Atomic(a) => a.string_value(),
            Item::Node(n) => arena.string_value(*n),
        }
    }

    /// The effective boolean value of a singleton item: nodes are true,
    /// atomics follow their own rule.
    pub fn effective_boolean(&self) -> Result<bool> {
        match self {
            Item::Node(_) => Ok(true),
            Item::Atomic(a) => a.effective_boolean(),
        }
    }
}

impl From<Atomic> for Item {
    fn from(a: Atomic) -> Self {
        Item::Atomic(a)
    }
}

impl From<Node> for Item {
    fn from(n: Node) -> Self {
        Item::Node(n)
    }
}
