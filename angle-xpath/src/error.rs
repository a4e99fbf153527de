use angle_xpath_ast::SyntaxError;

pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds surfaced by the engine.
///
/// [`Error::code`] maps each kind to a stable W3C-style code so hosts can
/// match on codes rather than variants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The expression could not be compiled.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// An operand does not have an acceptable type for the operation.
    #[error("type error: {0}")]
    Type(String),
    /// A variable, function or namespace prefix is not in scope.
    #[error("undefined name: {0}")]
    Undefined(String),
    /// An atomic cast failed.
    #[error("cannot cast '{value}' to {target}")]
    Cast { value: String, target: String },
    /// `div` or `mod` with a zero divisor.
    #[error("division by zero")]
    ZeroDivision,
    /// A function was called with the wrong number of arguments.
    #[error("wrong number of arguments for {0}()")]
    Argument(String),
    /// A node was required where an atomic was found, or vice versa.
    #[error("node error: {0}")]
    Node(String),
    /// A path that this implementation does not support.
    #[error("not implemented: {0}")]
    Implemented(String),
    /// `xsl:message terminate="yes"`, and the cooperative deadline.
    #[error("terminated: {0}")]
    Terminate(String),
    /// Document or resource resolution failed.
    #[error("i/o error: {0}")]
    Io(String),
}

impl Error {
    pub fn code(&self) -> &str {
        match self {
            Error::Syntax(e) => e.code,
            Error::Type(_) => "XPTY0004",
            Error::Undefined(_) => "XPST0008",
            Error::Cast { .. } => "FORG0001",
            Error::ZeroDivision => "FOAR0001",
            Error::Argument(_) => "XPST0017",
            Error::Node(_) => "XPTY0019",
            Error::Implemented(_) => "FOER0000",
            Error::Terminate(_) => "XTMM9000",
            Error::Io(_) => "FODC0002",
        }
    }
}

impl From<angle_xml::Error> for Error {
    fn from(e: angle_xml::Error) -> Self {
        match e {
            angle_xml::Error::Io(e) => Error::Io(e.to_string()),
            other => Error::Io(other.to_string()),
        }
    }
}
