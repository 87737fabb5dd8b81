//! Error type for the Run Store (§4.2, component C2).

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("run not found: {0}")]
    NotFound(String),

    #[error("concurrent modification conflict for run {0}")]
    Conflict(String),

    #[error("corrupt record at {path}: {detail}")]
    Corrupt { path: String, detail: String },
}

impl StorageError {
    pub fn serialization<E: std::fmt::Display>(err: E) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StorageError> for crate::error::GateError {
    fn from(e: StorageError) -> Self {
        use crate::error::{GateError, GateErrorKind};
        GateError::with_source(GateErrorKind::SystemError, e.to_string(), e)
    }
}
