//! Protocol error types.

use crate::message::StatusCode;
use thiserror::Error;

/// Protocol-level errors that can occur during framing or message handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid content type {0:?}: must be ASCII and at most 255 bytes")]
    InvalidContentType(String),

    #[error("truncated frame: need {needed} bytes, have {available}")]
    TruncatedFrame { needed: usize, available: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("fragment is not a sequence")]
    FragmentNotSequence,
}

/// Error status carried by a server response.
///
/// The connection never raises this itself; callers obtain it from
/// [`Response::err`](crate::Response::err) when they want to treat an error
/// status as a Rust error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ResponseError {
    pub code: StatusCode,
    pub message: String,
}
