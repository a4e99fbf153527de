use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while reading or writing XML documents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying XML reader rejected the input.
    #[error("malformed XML: {0}")]
    Parse(String),
    /// A prefix was used without a namespace declaration in scope.
    #[error("undeclared namespace prefix: {0}")]
    UndeclaredPrefix(String),
    /// Output I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The requested serialization method is not compiled in.
    #[error("serialization method not supported: {0}")]
    UnsupportedMethod(String),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
