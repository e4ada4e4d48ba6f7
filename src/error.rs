use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimSearchError {
    // Request validation errors
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown attribute: {attribute}")]
    UnknownAttribute { attribute: String },

    #[error("algorithm {algorithm} cannot run over attribute '{attribute}': {reason}")]
    IncompatibleAlgorithm {
        algorithm: String,
        attribute: String,
        reason: String,
    },

    // Source errors
    #[error("source unavailable for attribute '{attribute}': {reason}")]
    SourceUnavailable { attribute: String, reason: String },

    #[error("random access is not supported by attribute '{attribute}'")]
    UnsupportedAccess { attribute: String },

    #[error("unknown source: {source_name}")]
    UnknownSource { source_name: String },

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // Serialization errors
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // HTTP client errors
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // Internal
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SimSearchError>;

impl SimSearchError {
    pub fn status_code(&self) -> u16 {
        match self {
            SimSearchError::Validation(_) | SimSearchError::IncompatibleAlgorithm { .. } => 400,

            SimSearchError::UnknownAttribute { .. } | SimSearchError::UnknownSource { .. } => 404,

            SimSearchError::SourceUnavailable { .. } | SimSearchError::Http(_) => 502,

            _ => 500,
        }
    }

    /// Wrap a connector failure as `SourceUnavailable` for the given attribute.
    pub fn source_unavailable(attribute: &str, reason: impl std::fmt::Display) -> Self {
        SimSearchError::SourceUnavailable {
            attribute: attribute.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the source could not be reached or answered badly,
    /// as opposed to a contract or validation problem.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            SimSearchError::SourceUnavailable { .. }
                | SimSearchError::Http(_)
                | SimSearchError::Io(_)
        )
    }
}
