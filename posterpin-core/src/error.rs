use posterpin_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Poster service returned {status} for {endpoint}")]
    Service { endpoint: String, status: u16 },

    #[error("Malformed response from {0}")]
    MalformedResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ModelError> for PosterError {
    fn from(err: ModelError) -> Self {
        PosterError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PosterError>;
