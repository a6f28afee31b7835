//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Another request is already running for this session")]
    Busy,

    #[error("Unknown session: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure category shown to the user when a flow fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    Provider,
    Network,
    EmptyResponse,
    Timeout,
    Cancelled,
    NotFound,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Image(_) | Error::Busy => ErrorKind::Validation,
            Error::Auth(_) => ErrorKind::Auth,
            Error::AiProvider(_) => ErrorKind::Provider,
            Error::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Error::Http(_) => ErrorKind::Network,
            Error::EmptyResponse => ErrorKind::EmptyResponse,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::SessionNotFound(_) => ErrorKind::NotFound,
            Error::Io(_) | Error::Config(_) | Error::Invariant(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Auth("bad key".into()).kind(), ErrorKind::Auth);
        assert_eq!(Error::AiProvider("500".into()).kind(), ErrorKind::Provider);
        assert_eq!(Error::EmptyResponse.kind(), ErrorKind::EmptyResponse);
        assert_eq!(Error::Timeout(5).kind(), ErrorKind::Timeout);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(Error::Config("PORT".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EmptyResponse).unwrap();
        assert_eq!(json, "\"empty_response\"");
    }
}
