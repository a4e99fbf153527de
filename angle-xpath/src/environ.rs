use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use angle_xml::QName;

use crate::error::{Error, Result};

#[derive(Debug)]
struct Frame<T> {
    bindings: RefCell<AHashMap<QName, T>>,
    parent: Option<Rc<Frame<T>>>,
    readonly: bool,
}

/// Lexically scoped name bindings: a singly-linked chain of frames.
///
/// [`Environ::define`] writes the top frame, [`Environ::resolve`] walks
/// outward. Cloning shares the chain, so enclosing is cheap and sibling
/// scopes see definitions made in a shared outer frame.
#[derive(Debug, Clone)]
pub struct Environ<T> {
    head: Rc<Frame<T>>,
}

impl<T: Clone> Environ<T> {
    pub fn new() -> Self {
        Environ {
            head: Rc::new(Frame {
                bindings: RefCell::new(AHashMap::new()),
                parent: None,
                readonly: false,
            }),
        }
    }

    /// A child environment: new empty frame on top of this chain.
    pub fn enclosed(&self) -> Self {
        Environ {
            head: Rc::new(Frame {
                bindings: RefCell::new(AHashMap::new()),
                parent: Some(self.head.clone()),
                readonly: false,
            }),
        }
    }

    /// A wrapper whose own frame rejects definitions; resolution still
    /// reaches the wrapped chain.
    pub fn readonly(&self) -> Self {
        Environ {
            head: Rc::new(Frame {
                bindings: RefCell::new(AHashMap::new()),
                parent: Some(self.head.clone()),
                readonly: true,
            }),
        }
    }

    pub fn define(&self, name: QName, value: T) -> Result<()> {
        if self.head.readonly {
            return Err(Error::Type(format!(
                "cannot define {} in a read-only scope",
                name
            )));
        }
        self.head.bindings.borrow_mut().insert(name, value);
        Ok(())
    }

    pub fn resolve(&self, name: &QName) -> Option<T> {
        let mut frame = Some(&self.head);
        while let Some(current) = frame {
            if let Some(value) = current.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            frame = current.parent.as_ref();
        }
        None
    }

    pub fn is_defined(&self, name: &QName) -> bool {
        self.resolve(name).is_some()
    }

    /// Fold every binding visible in `other` into the top frame of this
    /// chain; inner frames of `other` win over its outer ones.
    pub fn merge(&self, other: &Environ<T>) -> Result<()> {
        let mut chain = Vec::new();
        let mut frame = Some(&other.head);
        while let Some(current) = frame {
            chain.push(current);
            frame = current.parent.as_ref();
        }
        for frame in chain.into_iter().rev() {
            for (name, value) in frame.bindings.borrow().iter() {
                self.define(name.clone(), value.clone())?;
            }
        }
        Ok(())
    }
}

impl<T: Clone> Default for Environ<T> {
    fn default() -> Self {
        Environ::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> QName {
        QName::new(s)
    }

    #[test]
    fn resolve_walks_outward() {
        let outer = Environ::new();
        outer.define(name("a"), 1).unwrap();
        let inner = outer.enclosed();
        inner.define(name("b"), 2).unwrap();
        assert_eq!(inner.resolve(&name("a")), Some(1));
        assert_eq!(inner.resolve(&name("b")), Some(2));
        assert_eq!(outer.resolve(&name("b")), None);
    }

    #[test]
    fn inner_definition_shadows() {
        let outer = Environ::new();
        outer.define(name("a"), 1).unwrap();
        let inner = outer.enclosed();
        inner.define(name("a"), 2).unwrap();
        assert_eq!(inner.resolve(&name("a")), Some(2));
        assert_eq!(outer.resolve(&name("a")), Some(1));
    }

    #[test]
    fn readonly_rejects_define() {
        let outer = Environ::new();
        outer.define(name("a"), 1).unwrap();
        let guarded = outer.readonly();
        assert!(guarded.define(name("b"), 2).is_err());
        assert_eq!(guarded.resolve(&name("a")), Some(1));
    }

    #[test]
    fn merge_folds_whole_chain() {
        let source = Environ::new();
        source.define(name("a"), 1).unwrap();
        let inner = source.enclosed();
        inner.define(name("a"), 2).unwrap();
        inner.define(name("b"), 3).unwrap();
        let target = Environ::new();
        target.merge(&inner).unwrap();
        assert_eq!(target.resolve(&name("a")), Some(2));
        assert_eq!(target.resolve(&name("b")), Some(3));
    }
}
