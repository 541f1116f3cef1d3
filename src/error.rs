use std::fmt;
use std::io;

pub(crate) type ColorcatResult<T> = Result<T, Error>;

/// Errors that can occur during colorcat usage
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar, theme or source file.
    Io(io::Error),

    /// JSON parsing failed when loading a grammar or a theme.
    Json(serde_json::Error),

    /// Plist parsing failed when loading a grammar.
    Plist(plist::Error),

    /// A regex failed to compile or a begin/end/while pairing is malformed.
    /// Can only happen while compiling a grammar.
    GrammarSyntax(String),

    /// The grammar's declared scope does not match its file name.
    /// Only raised when the loader runs in strict mode.
    #[allow(missing_docs)]
    ScopeNameMismatch { expected: String, found: String },

    /// A grammar lookup by scope name or file type failed.
    NotFound(String),

    /// A runtime include could not locate its target scope or rule.
    IncludeUnresolved(String),

    /// The regex engine reported an error while matching.
    RegexRuntime(String),

    /// An invalid hex color was encountered.
    /// Can only happen when loading a theme.
    #[allow(missing_docs)]
    InvalidHexColor { value: String, reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::Plist(err) => write!(f, "plist parsing error: {}", err),
            Error::GrammarSyntax(message) => write!(f, "grammar syntax error: {}", message),
            Error::ScopeNameMismatch { expected, found } => {
                write!(f, "expected scope '{}', got '{}'", expected, found)
            }
            Error::NotFound(name) => write!(f, "grammar '{}' not found", name),
            Error::IncludeUnresolved(message) => write!(f, "unable to include {}", message),
            Error::RegexRuntime(message) => write!(f, "regex error: {}", message),
            Error::InvalidHexColor { value, reason } => {
                write!(f, "invalid hex color '{}': {}", value, reason)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Plist(err) => Some(err),
            Error::GrammarSyntax(_)
            | Error::ScopeNameMismatch { .. }
            | Error::NotFound(_)
            | Error::IncludeUnresolved(_)
            | Error::RegexRuntime(_)
            | Error::InvalidHexColor { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<plist::Error> for Error {
    fn from(err: plist::Error) -> Self {
        Error::Plist(err)
    }
}
