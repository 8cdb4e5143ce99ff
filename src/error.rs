//! Error type shared by the configuration, data loading and training code.

use thiserror::Error;

/// Errors surfaced by fallible library operations.
///
/// Buffer length mismatches inside forward/backward passes are programmer
/// errors and panic instead; this type covers everything that depends on
/// external input (files, JSON, dataset contents) or on training diverging.
#[derive(Debug, Error)]
pub enum BenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed dataset file {path}: {reason}")]
    Dataset { path: String, reason: String },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("training loss became non-finite ({loss}) in epoch {epoch}")]
    NonFiniteLoss { epoch: usize, loss: f32 },
}

pub type Result<T> = std::result::Result<T, BenderError>;

impl BenderError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        BenderError::InvalidConfig(message.into())
    }
}
