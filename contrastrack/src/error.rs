//! Error types for the assignment and contrastive selection library

use thiserror::Error;

/// Result type alias for the assignment library
pub type Result<T> = std::result::Result<T, MatchError>;

/// Errors that can occur during assignment and contrast selection
///
/// All variants describe caller contract violations. Nothing here is retried.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Object queue is empty")]
    EmptyQueue,

    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Non-finite values in {0}")]
    NonFinite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MatchError {
    pub fn shape<S: Into<String>>(context: S, expected: Vec<usize>, actual: Vec<usize>) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
