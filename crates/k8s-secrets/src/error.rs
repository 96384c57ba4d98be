//! Store errors

use thiserror::Error;

/// Errors raised by the environment store and its tables
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid environment name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("Secret key cannot be empty")]
    EmptyKey,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table error: {0}")]
    Table(#[from] csv::Error),
}

impl StoreError {
    /// Validation errors are rejected before any file is touched
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::InvalidName(_) | StoreError::EmptyKey)
    }
}
