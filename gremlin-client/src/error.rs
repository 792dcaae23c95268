//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] gremlin_protocol::ProtocolError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("dialing {uri}: {source}")]
    Dial {
        uri: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("server connection closed")]
    ConnectionClosed,

    #[error("duplicate request id: {0}")]
    DuplicateRequest(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("timed out")]
    Timeout,

    #[error("assembling fragmented response: {0}")]
    Fragment(#[source] gremlin_protocol::ProtocolError),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

impl ClientError {
    /// Returns whether retrying on a fresh connection may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::WebSocket(_)
                | ClientError::Dial { .. }
                | ClientError::ConnectionClosed
                | ClientError::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::WebSocket(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            .is_retryable());
        assert!(!ClientError::TlsConfig("no certificates".into()).is_retryable());
        assert!(!ClientError::DuplicateRequest("a".into()).is_retryable());
        assert!(!ClientError::Cancelled.is_retryable());
        assert!(!ClientError::Fragment(gremlin_protocol::ProtocolError::FragmentNotSequence)
            .is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ClientError::ConnectionClosed.to_string(),
            "server connection closed"
        );
        assert!(ClientError::DuplicateRequest("req-7".into())
            .to_string()
            .contains("req-7"));
    }
}
