//! XSLT 3.0 transformation engine driving the Angle XPath evaluator.
//!
//! A [`Stylesheet`] is loaded once (imports and includes resolved, match
//! patterns compiled, modes and outputs collected) and can then transform
//! any number of documents sharing its arena. Template bodies are walked
//! by instruction executors that each produce a sequence; the dispatcher
//! attaches those sequences to the result tree under construction.

mod avt;
mod exec;
mod matcher;
mod stylesheet;

pub use stylesheet::{NoMatchPolicy, Stylesheet};
