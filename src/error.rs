//! Error types for the Sedge library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! crate-wide [`SedgeError`] enum.

use std::io;

use thiserror::Error;

/// The main error type for Sedge operations.
#[derive(Error, Debug)]
pub enum SedgeError {
    /// I/O errors (file operations, socket setup, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A caller supplied an unusable argument (blank document id,
    /// privileged port, malformed query).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The forward store could not be opened, read or written.
    #[error("storage unavailable: {0}")]
    Storage(String),

    /// The service registry could not be reached or refused the operation.
    #[error("registry unavailable: {0}")]
    Registry(String),

    /// Discovery produced no endpoint able to take the request.
    #[error("no live worker for service {0:?}")]
    NoLiveWorker(String),

    /// Dialing a peer or issuing an RPC failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The proxy's token bucket denied a discovery call.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A stored record could not be decoded.
    #[error("internal error: {0}")]
    Internal(String),

    /// JSON encoding or decoding of a document record failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with [`SedgeError`].
pub type Result<T> = std::result::Result<T, SedgeError>;

impl SedgeError {
    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SedgeError::InvalidArgument(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        SedgeError::Storage(msg.into())
    }

    /// Create a new registry error.
    pub fn registry<S: Into<String>>(msg: S) -> Self {
        SedgeError::Registry(msg.into())
    }

    /// Create a new transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        SedgeError::Transport(msg.into())
    }

    /// Create a new rate limited error.
    pub fn rate_limited<S: Into<String>>(msg: S) -> Self {
        SedgeError::RateLimited(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        SedgeError::Internal(msg.into())
    }

    /// Create a new no live worker error for the given service.
    pub fn no_live_worker<S: Into<String>>(service: S) -> Self {
        SedgeError::NoLiveWorker(service.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SedgeError::invalid_argument("blank id");
        assert_eq!(error.to_string(), "invalid argument: blank id");

        let error = SedgeError::storage("cannot open");
        assert_eq!(error.to_string(), "storage unavailable: cannot open");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing");
        let error = SedgeError::from(io_error);
        match error {
            SedgeError::Io(_) => {}
            _ => panic!("expected Io variant"),
        }
    }
}
