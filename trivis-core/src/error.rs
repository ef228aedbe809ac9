//! Error types for trivis

use thiserror::Error;

/// Main error type for trivis operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}
