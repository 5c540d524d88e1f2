use thiserror::Error;

/// Fatal engine-level errors. Probe failures never show up here; they are
/// folded into `ProbeOutcome` values and degrade the finding status instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("A collection run is already active")]
    RunActive,

    #[error("No targets submitted")]
    NoTargets,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("File error: {path:?} - {message}")]
    FileError { path: std::path::PathBuf, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(error: anyhow::Error) -> Self {
        EngineError::UnexpectedError(error.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
