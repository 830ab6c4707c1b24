use thiserror::Error;

/// Application-wide error types for chemfetch.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid construction parameters. Raised before any job runs.
    #[error("Config error: {0}")]
    Config(String),

    /// A network/protocol step failed while fetching one job.
    ///
    /// `stage` names the protocol step that failed ("token", "submit",
    /// "download", "timeout", ...), so a multi-step fetch pinpoints where
    /// it died.
    #[error("Fetch error at stage '{stage}': {cause}")]
    Fetch { stage: String, cause: String },

    /// The fetched document had an unexpected shape.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The server signalled that the allowed query rate was exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl EngineError {
    /// Shorthand for a fetch failure at a named protocol stage.
    pub fn fetch(stage: impl Into<String>, cause: impl Into<String>) -> Self {
        EngineError::Fetch {
            stage: stage.into(),
            cause: cause.into(),
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RateLimited => true,
            EngineError::Fetch { stage, cause } => {
                stage == "timeout"
                    || cause.contains("timeout")
                    || cause.contains("connect")
                    || cause.contains("reset")
            }
            _ => false,
        }
    }
}
