//! Tokenizer for the XPath surface syntax.
//!
//! Word operators (`and`, `div`, `cast`, …) are deliberately not lexed as
//! keywords: they reach the parser as [`Token::NCName`] and are given
//! operator meaning contextually, since every one of them is also a legal
//! element name. QNames are likewise assembled in the parser, which checks
//! that `prefix`, `:` and `local` are adjacent in the source.

mod lexer;

pub use lexer::{lexer, Span, Token};
