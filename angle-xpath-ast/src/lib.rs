//! XPath abstract syntax and its parser.
//!
//! The grammar is compiled by a Pratt (operator precedence) parser working
//! over the token stream of `angle-xpath-lexer`. Namespace prefixes are
//! resolved during parsing, so an expression that survives [`parse`] never
//! fails on an unknown prefix at evaluation time.

mod ast;
mod error;
mod parser;
mod pattern;

pub use ast::{Axis, BinaryOp, Binding, Expr, KindTest, Occurrence, SchemaType};
pub use error::{SyntaxError, XPST0003, XPST0008, XPST0017, XPST0018, XPST0051, XQST0039};
pub use parser::parse;
pub use pattern::{parse_pattern, pattern_priority};
