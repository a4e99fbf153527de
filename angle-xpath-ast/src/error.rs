use angle_xpath_lexer::Span;

/// Generic static syntax error.
pub const XPST0003: &str = "XPST0003";
/// Name (variable, namespace prefix) not defined in the static context.
pub const XPST0008: &str = "XPST0008";
/// No function with the given name and arity.
pub const XPST0017: &str = "XPST0017";
/// A path produced a mix of nodes and atomics.
pub const XPST0018: &str = "XPST0018";
/// Unknown type name in a cast, castable or instance-of expression.
pub const XPST0051: &str = "XPST0051";
/// Duplicate binding name in a single clause.
pub const XQST0039: &str = "XQST0039";

/// A positioned compile-time error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message} at offset {}", span.start)]
pub struct SyntaxError {
    /// Stable W3C-style error code.
    pub code: &'static str,
    /// What the parser was looking at, human readable.
    pub message: String,
    /// Byte range in the source expression.
    pub span: Span,
}

impl SyntaxError {
    pub fn new(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        SyntaxError {
            code,
            message: message.into(),
            span,
        }
    }
}
