//! Attribute-value templates.
//!
//! A left-to-right scan splits an attribute literal into literal and
//! `{expr}` chunks; `{{` and `}}` escape braces. The chunks are evaluated
//! and concatenated after stringification.

use angle_xpath::{eval, Context, Error, Result};
use angle_xpath_ast::parse;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Chunk {
    Literal(String),
    Expr(String),
}

pub(crate) fn scan(value: &str) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    let mut literal = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                if !literal.is_empty() {
                    chunks.push(Chunk::Literal(std::mem::take(&mut literal)));
                }
                let mut expr = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    expr.push(c);
                }
                if !closed {
                    return Err(Error::Type(format!(
                        "unterminated expression in attribute template '{}'",
                        value
                    )));
                }
                chunks.push(Chunk::Expr(expr));
            }
            '}' => {
                return Err(Error::Type(format!(
                    "stray '}}' in attribute template '{}'",
                    value
                )));
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        chunks.push(Chunk::Literal(literal));
    }
    Ok(chunks)
}

/// Evaluate an attribute value, expanding `{…}` against the context.
pub(crate) fn eval_avt(value: &str, ctx: &Context) -> Result<String> {
    let mut out = String::new();
    for chunk in scan(value)? {
        match chunk {
            Chunk::Literal(text) => out.push_str(&text),
            Chunk::Expr(source) => {
                let expr = parse(&source, &ctx.namespaces)?;
                let result = eval(&expr, ctx)?;
                let arena = ctx.arena.borrow();
                out.push_str(&result.string_values(&arena).join(" "));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_alternating_chunks() {
        let chunks = scan("a{1 + 2}b{$x}").unwrap();
        assert_eq!(
            chunks,
            vec![
                Chunk::Literal("a".to_string()),
                Chunk::Expr("1 + 2".to_string()),
                Chunk::Literal("b".to_string()),
                Chunk::Expr("$x".to_string()),
            ]
        );
    }

    #[test]
    fn doubled_braces_escape() {
        let chunks = scan("a{{b}}c").unwrap();
        assert_eq!(chunks, vec![Chunk::Literal("a{b}c".to_string())]);
    }

    #[test]
    fn unterminated_expression_fails() {
        assert!(scan("{oops").is_err());
        assert!(scan("oops}").is_err());
    }

    #[test]
    fn empty_value_scans_empty() {
        assert!(scan("").unwrap().is_empty());
    }
}
