use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("corrupt document at {path}: {reason}")]
    CorruptDocument { path: PathBuf, reason: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("transient io failure: {0}")]
    TransientIo(#[from] io::Error),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invoice generation failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

impl StoreError {
    /// Transient failures are the only class the retry driver re-attempts;
    /// everything else propagates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransientIo(_))
    }

    pub fn not_found(family: &str, id: &str) -> Self {
        StoreError::NotFound(format!("{family} {id}"))
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
