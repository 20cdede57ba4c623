use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    EmptyUser,
    InvalidSlug(String),
    InvalidPosterUrl(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::EmptyUser => write!(f, "username cannot be empty"),
            ModelError::InvalidSlug(raw) => {
                write!(f, "invalid film slug: {raw:?}")
            }
            ModelError::InvalidPosterUrl(msg) => {
                write!(f, "invalid poster url: {msg}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
