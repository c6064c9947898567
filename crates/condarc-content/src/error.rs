//! Error types for condarc-content

/// Result type for condarc-content operations
pub type Result<T> = std::result::Result<T, Error>;

/// A syntax problem in a configuration source.
///
/// `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn from_yaml(err: &serde_yaml::Error) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));
        Self::new(line, column, err.to_string())
    }

    pub(crate) fn from_json(err: &serde_json::Error) -> Self {
        Self::new(err.line().max(1), err.column().max(1), err.to_string())
    }
}

/// Errors that can occur in condarc-content operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse document: {0}")]
    Parse(#[from] ParseError),

    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Cannot set {path}: {reason}")]
    PathSetFailed { path: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
