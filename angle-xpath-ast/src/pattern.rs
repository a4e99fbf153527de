//! The restricted XPath subset allowed in match patterns.
//!
//! Patterns reuse the full expression parser, then reject anything outside
//! the subset: rooted or relative step chains of name/kind/attribute tests
//! with predicates, and a top-level union. Predicates themselves stay full
//! XPath.

use angle_xml::Namespaces;

use crate::ast::{Axis, Expr};
use crate::error::{SyntaxError, XPST0003};
use crate::parser::parse;

const PATTERN_AXES: &[Axis] = &[
    Axis::Child,
    Axis::Descendant,
    Axis::DescendantOrSelf,
    Axis::SelfAxis,
    Axis::Attribute,
    Axis::Namespace,
];

/// Compile a match pattern.
pub fn parse_pattern(source: &str, namespaces: &Namespaces) -> Result<Expr, SyntaxError> {
    let expr = parse(source, namespaces)?;
    validate(&expr).map_err(|what| {
        SyntaxError::new(
            XPST0003,
            format!("{} is not allowed in a pattern", what),
            0..source.len(),
        )
    })?;
    Ok(expr)
}

fn validate(expr: &Expr) -> Result<(), &'static str> {
    match expr {
        Expr::Union { left, right } => {
            validate(left)?;
            validate(right)
        }
        _ => validate_path(expr),
    }
}

fn validate_path(expr: &Expr) -> Result<(), &'static str> {
    match expr {
        Expr::Root | Expr::Current | Expr::Wildcard | Expr::Name(_) | Expr::Kind(_) | Expr::Attr(_) => {
            Ok(())
        }
        Expr::Step { curr, next } => {
            validate_path(curr)?;
            validate_path(next)
        }
        Expr::Axis { axis, next } => {
            if !PATTERN_AXES.contains(axis) {
                return Err("this axis");
            }
            validate_path(next)
        }
        // the predicate itself is full XPath
        Expr::Filter { expr, .. } | Expr::Subscript { expr, .. } => validate_path(expr),
        _ => Err("this expression"),
    }
}

/// The default priority derived from the shape of a pattern: a bare name
/// (or `@name`) scores 1, a predicate adds 1, a kind test or wildcard
/// scores 0, a union takes the best of its branches. The last step of a
/// path decides.
pub fn pattern_priority(expr: &Expr) -> f64 {
    match expr {
        Expr::Union { left, right } => pattern_priority(left).max(pattern_priority(right)),
        Expr::Filter { expr, .. } | Expr::Subscript { expr, .. } => pattern_priority(expr) + 1.0,
        Expr::Step { next, .. } => pattern_priority(next),
        Expr::Axis { next, .. } => pattern_priority(next),
        Expr::Name(_) | Expr::Attr(_) => 1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(source: &str) -> Result<Expr, SyntaxError> {
        let namespaces = Namespaces::new();
        parse_pattern(source, &namespaces)
    }

    #[test]
    fn accepts_step_patterns() {
        assert!(pattern("item").is_ok());
        assert!(pattern("/root/item").is_ok());
        assert!(pattern("//item[@id]").is_ok());
        assert!(pattern("@lang").is_ok());
        assert!(pattern("text()").is_ok());
        assert!(pattern("a | b").is_ok());
        assert!(pattern("self::item").is_ok());
    }

    #[test]
    fn rejects_out_of_subset() {
        assert!(pattern("1 + 2").is_err());
        assert!(pattern("parent::item").is_err());
        assert!(pattern("ancestor::item").is_err());
        assert!(pattern("$v").is_err());
    }

    #[test]
    fn predicates_stay_full_xpath() {
        assert!(pattern("item[position() = last()]").is_ok());
        assert!(pattern("item[@id = 'fst'][2]").is_ok());
    }

    #[test]
    fn priorities_follow_shape() {
        let name = pattern("item").unwrap();
        let with_pred = pattern("item[@id]").unwrap();
        let kind = pattern("text()").unwrap();
        let attr = pattern("@lang").unwrap();
        let union = pattern("item[@id] | text()").unwrap();
        assert_eq!(pattern_priority(&name), 1.0);
        assert_eq!(pattern_priority(&with_pred), 2.0);
        assert_eq!(pattern_priority(&kind), 0.0);
        assert_eq!(pattern_priority(&attr), 1.0);
        assert_eq!(pattern_priority(&union), 2.0);
    }
}
