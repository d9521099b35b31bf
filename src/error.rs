use thiserror::Error;

#[derive(Debug, Error)]
pub enum CharacterizationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid file format in {path}: {reason}")]
    InvalidLogFormat { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("plotting failed: {0}")]
    Plot(String),
}

impl CharacterizationError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }
}
