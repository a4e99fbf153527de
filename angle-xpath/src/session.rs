use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use angle_xml::{Arena, Namespaces, Node, QName};
use angle_xpath_ast::Expr;

use crate::context::Context;
use crate::environ::Environ;
use crate::error::Result;
use crate::eval::eval;
use crate::function::{Registry, UserFn};
use crate::sequence::Sequence;

/// One evaluation session: an arena of documents plus the static context
/// hosts configure before compiling queries.
pub struct Session {
    arena: RefCell<Arena>,
    namespaces: Namespaces,
    registry: Registry,
    variables: Environ<Sequence>,
    base_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            arena: RefCell::new(Arena::new()),
            namespaces: Namespaces::new(),
            registry: Registry::with_builtins(),
            variables: Environ::new(),
            base_dir: None,
            timeout: None,
        }
    }

    pub fn arena(&self) -> &RefCell<Arena> {
        &self.arena
    }

    /// Parse a document into the session arena.
    pub fn load_str(&self, xml: &str) -> Result<Node> {
        let node = self.arena.borrow_mut().parse_str(xml)?;
        Ok(node)
    }

    pub fn register_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.declare(prefix, uri);
    }

    pub fn set_default_element_namespace(&mut self, uri: &str) {
        self.namespaces.set_default_element_namespace(uri);
    }

    pub fn register_function(&mut self, name: QName, arity: usize, call: UserFn) {
        self.registry.register_user(name, arity, call);
    }

    pub fn set_variable(&mut self, name: QName, value: Sequence) {
        // session variables live in the outermost frame; evaluation scopes
        // enclose it and cannot clobber it
        let _ = self.variables.define(name, value);
    }

    pub fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = Some(dir.into());
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Compile a query against the registered namespaces.
    pub fn compile(&self, source: &str) -> Result<Expr> {
        Ok(angle_xpath_ast::parse(source, &self.namespaces)?)
    }

    /// A fresh context focused on `node`.
    pub fn context(&self, node: Node) -> Context<'_> {
        let mut context = Context::new(&self.arena, &self.registry, node);
        context.variables = self.variables.enclosed();
        context.namespaces = Rc::new(self.namespaces.clone());
        context.base_dir = self.base_dir.clone().map(Rc::new);
        context.deadline = self.timeout.map(|t| Instant::now() + t);
        context
    }

    pub fn evaluate(&self, expr: &Expr, node: Node) -> Result<Sequence> {
        eval(expr, &self.context(node))
    }

    /// Compile and evaluate in one go.
    pub fn find(&self, query: &str, node: Node) -> Result<Sequence> {
        let expr = self.compile(query)?;
        self.evaluate(&expr, node)
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
