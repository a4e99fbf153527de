use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use angle_xml::{QName, FN_NAMESPACE};
use angle_xpath_ast::Expr;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::sequence::Sequence;

/// A builtin receives the calling context and its unevaluated argument
/// expressions; arity has been checked by the registry.
pub type BuiltinFn = fn(&Context, &[Expr]) -> Result<Sequence>;

/// Host and stylesheet functions receive evaluated arguments.
pub type UserFn = Rc<dyn Fn(&Context, Vec<Sequence>) -> Result<Sequence>>;

#[derive(Clone)]
pub enum Function {
    Builtin {
        min: usize,
        max: usize,
        call: BuiltinFn,
    },
    User {
        arity: usize,
        call: UserFn,
    },
}

impl Function {
    fn accepts(&self, arity: usize) -> bool {
        match self {
            Function::Builtin { min, max, .. } => (*min..=*max).contains(&arity),
            // user functions may leave trailing parameters to their defaults
            Function::User { arity: declared, .. } => arity <= *declared,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin { min, max, .. } => write!(f, "Builtin({}..{})", min, max),
            Function::User { arity, .. } => write!(f, "User({})", arity),
        }
    }
}

/// Function table keyed by expanded QName.
///
/// Unprefixed call names fall into the default function namespace before
/// lookup, so every key in here carries a URI.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    table: AHashMap<QName, Vec<Function>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry preloaded with the standard function library.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        crate::library::register(&mut registry);
        registry
    }

    pub fn register_builtin(
        &mut self,
        uri: &str,
        local: &str,
        min: usize,
        max: usize,
        call: BuiltinFn,
    ) {
        let name = QName::with_uri(local, uri);
        self.table
            .entry(name)
            .or_default()
            .push(Function::Builtin { min, max, call });
    }

    pub fn register_user(&mut self, name: QName, arity: usize, call: UserFn) {
        self.table
            .entry(expand(name))
            .or_default()
            .push(Function::User { arity, call });
    }

    /// Resolve by expanded name and arity. An unknown name is an undefined
    /// error; a known name with no matching arity is `XPST0017`.
    pub fn resolve(&self, name: &QName, arity: usize) -> Result<&Function> {
        let expanded = expand(name.clone());
        let entries = self
            .table
            .get(&expanded)
            .ok_or_else(|| Error::Undefined(format!("function {}", name)))?;
        entries
            .iter()
            // last registration wins so hosts can shadow builtins
            .rev()
            .find(|f| f.accepts(arity))
            .ok_or_else(|| Error::Argument(name.local.clone()))
    }
}

fn expand(name: QName) -> QName {
    if name.uri.is_some() {
        name
    } else {
        QName {
            uri: Some(FN_NAMESPACE.to_string()),
            ..name
        }
    }
}
