//! Arena-backed XML document model for Angle.
//!
//! All trees that take part in one processing session (source documents,
//! stylesheets, result trees, fragments) live in a single [`Arena`]; nodes
//! are small copyable handles into it. Node identity is the handle.

mod arena;
mod error;
mod name;
mod parse;
mod serialize;

pub use arena::{Arena, Node, NodeKind};
pub use error::{Error, Result};
pub use name::{
    Namespaces, QName, ANGLE_NAMESPACE, FN_NAMESPACE, SCH_NAMESPACE, XML_NAMESPACE, XSL_NAMESPACE,
    XS_NAMESPACE,
};
pub use serialize::{Method, Output};
