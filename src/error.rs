pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("type mismatch in field {field}: expected {expected}, got {value:?}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        value: String,
    },

    #[error("conflicting schema registration for field: {0}")]
    SchemaConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("index write failed: {0}")]
    IndexWrite(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error aborts the indexing run of the current file.
    ///
    /// Per-record problems (a bad annotation value, an undecodable document)
    /// are reported and skipped; engine and I/O failures are not.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::TypeMismatch { .. } | Error::MalformedDocument(_) | Error::NotFound(_) => false,
            Error::SchemaConflict(_)
            | Error::InvalidInput(_)
            | Error::InvalidRange(_)
            | Error::IndexWrite(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal(_) => true,
        }
    }

    pub(crate) fn type_mismatch(field: &str, expected: &'static str, value: &str) -> Self {
        Error::TypeMismatch {
            field: field.to_string(),
            expected,
            value: value.to_string(),
        }
    }
}
