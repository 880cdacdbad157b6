use std::path::PathBuf;
use thiserror::Error;

/// Failures of the record lifecycle layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] eegp_lib::Error),
    #[error("config {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error("render failed: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

impl StoreError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::Core(eegp_lib::Error::not_found(what))
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Core(eegp_lib::Error::Precondition(msg.into()))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Core(eegp_lib::Error::validation(msg))
    }

    /// The core error, when this wraps one.
    pub fn core(&self) -> Option<&eegp_lib::Error> {
        match self {
            Self::Core(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.core(), Some(eegp_lib::Error::NotFound(_)))
    }
}
