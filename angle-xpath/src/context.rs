use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use angle_xml::{Arena, Namespaces, Node, NodeKind, QName, ANGLE_NAMESPACE};
use chrono::{DateTime, FixedOffset};

use crate::environ::Environ;
use crate::error::{Error, Result};
use crate::function::Registry;
use crate::item::Item;
use crate::sequence::Sequence;

/// The evaluation focus and everything in scope at it.
///
/// A context is created per evaluation; refocusing ([`Context::sub`]) and
/// nesting the variable scope ([`Context::nest`]) produce cheap clones
/// sharing the arena, registry and outer scopes. `now` is captured once at
/// construction so one evaluation sees one clock reading.
#[derive(Clone)]
pub struct Context<'a> {
    pub arena: &'a RefCell<Arena>,
    pub registry: &'a Registry,
    /// The focus item.
    pub item: Item,
    /// 1-based position of the focus within the focus sequence.
    pub position: usize,
    /// Size of the focus sequence.
    pub size: usize,
    /// The node kind an unqualified name test selects on the current axis.
    pub principal: NodeKind,
    pub variables: Environ<Sequence>,
    pub namespaces: Rc<Namespaces>,
    pub base_dir: Option<Rc<PathBuf>>,
    pub now: DateTime<FixedOffset>,
    pub deadline: Option<Instant>,
}

impl<'a> Context<'a> {
    pub fn new(arena: &'a RefCell<Arena>, registry: &'a Registry, node: Node) -> Self {
        Context {
            arena,
            registry,
            item: Item::Node(node),
            position: 1,
            size: 1,
            principal: NodeKind::Element,
            variables: Environ::new(),
            namespaces: Rc::new(Namespaces::new()),
            now: chrono::Local::now().fixed_offset(),
            base_dir: None,
            deadline: None,
        }
    }

    /// The focus as a node; an atomic focus is a node error.
    pub fn node(&self) -> Result<Node> {
        self.item.to_node()
    }

    /// A child context with an enclosed variable scope.
    pub fn nest(&self) -> Self {
        let mut child = self.clone();
        child.variables = self.variables.enclosed();
        child
    }

    /// A child context refocused on another item, inheriting every scope.
    pub fn sub(&self, item: impl Into<Item>, position: usize, size: usize) -> Self {
        let mut child = self.clone();
        child.item = item.into();
        child.position = position;
        child.size = size;
        child.principal = NodeKind::Element;
        child
    }

    pub fn with_principal(mut self, principal: NodeKind) -> Self {
        self.principal = principal;
        self
    }

    /// Cooperative cancellation, checked between instruction boundaries and
    /// inside large traversals.
    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() > deadline => {
                Err(Error::Terminate("deadline exceeded".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Names for implicit bindings the XSLT driver places in scope, such as the
/// current group. They live in the extension namespace so user variables
/// cannot collide with them.
pub fn hidden_name(local: &str) -> QName {
    QName::with_uri(local, ANGLE_NAMESPACE)
}
