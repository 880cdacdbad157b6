use thiserror::Error;

/// Failure conditions surfaced by the signal core.
///
/// Every variant is a distinct, caller-visible condition; none of them is
/// retried or swallowed internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unsupported device type '{0}'")]
    UnsupportedDevice(String),
    #[error("Check frequency values: {0}")]
    InvalidFrequency(String),
    #[error("Array must not contain infs or NaNs: {0}")]
    NumericInstability(String),
    #[error("no stimulus events found in the stimulus channel")]
    NoEventsFound,
    #[error("{0}")]
    Precondition(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_frequency(msg: impl Into<String>) -> Self {
        Self::InvalidFrequency(msg.into())
    }
}
