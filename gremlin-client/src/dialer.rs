//! Opening connections.

use crate::connection::{Conn, ConnectionConfig};
use crate::error::ClientError;
use crate::tls::create_connector;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;

/// Opens WebSocket connections to a Gremlin server.
#[derive(Debug, Clone, Default)]
pub struct Dialer {
    config: ConnectionConfig,
}

impl Dialer {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Answers authentication challenges with these credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config = self.config.with_credentials(username, password);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to `uri` (`ws://` or `wss://`).
    pub async fn dial(&self, uri: &str) -> Result<Conn, ClientError> {
        self.dial_with_cancel(uri, &CancellationToken::new()).await
    }

    /// Connects to `uri`, giving up once `cancel` fires or the handshake
    /// timeout elapses.
    pub async fn dial_with_cancel(
        &self,
        uri: &str,
        cancel: &CancellationToken,
    ) -> Result<Conn, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let connector = create_connector(self.config.tls.as_ref())?;
        let ws_config = WebSocketConfig {
            max_message_size: Some(self.config.max_message_size),
            ..Default::default()
        };

        tracing::debug!("Dialing {}", uri);
        let connect =
            tokio_tungstenite::connect_async_tls_with_config(uri, Some(ws_config), true, connector);
        let handshake = tokio::time::timeout(self.config.handshake_timeout, connect);
        let (ws, _) = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = handshake => match result {
                Err(_) => return Err(ClientError::Timeout),
                Ok(Err(source)) => {
                    return Err(ClientError::Dial {
                        uri: uri.to_string(),
                        source,
                    })
                }
                Ok(Ok(connected)) => connected,
            },
        };

        tracing::debug!("Connected to {}", uri);
        Ok(Conn::new(ws, self.config.clone()))
    }
}

/// Connects to `uri` with the default configuration.
pub async fn dial(uri: &str) -> Result<Conn, ClientError> {
    Dialer::default().dial(uri).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use gremlin_protocol::{Decoder, Encoder, Request, Response, StatusCode};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_dialer_credentials() {
        let dialer = Dialer::default().with_credentials("user", "pass");
        let credentials = dialer.config().credentials.as_ref().unwrap();
        assert_eq!(credentials.username, "user");
        assert_eq!(credentials.password, "pass");
    }

    #[tokio::test]
    async fn test_dial_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Dialer::default()
            .dial_with_cancel("ws://127.0.0.1:1", &cancel)
            .await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dial_invalid_uri() {
        let result = dial("not a uri").await;
        assert!(matches!(result, Err(ClientError::Dial { .. })));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Grab a free port, then release it so nothing is listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = dial(&format!("ws://{}", addr)).await.err().unwrap();
        assert!(matches!(err, ClientError::Dial { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        // Accepts TCP but never completes the WebSocket handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(tcp);
        });

        let config = ConnectionConfig::new().with_handshake_timeout(Duration::from_millis(50));
        let result = Dialer::new(config).dial(&format!("ws://{}", addr)).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        server.abort();
    }

    #[tokio::test]
    async fn test_dial_and_execute() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Binary(data) = msg {
                    let (_, req) = Decoder::decode_request(&data).unwrap();
                    let rsp = Response::new(&req.request_id, StatusCode::NoContent);
                    let body = Encoder::encode_response(&rsp).unwrap();
                    ws.send(Message::Binary(body.to_vec())).await.unwrap();
                }
            }
        });

        let conn = dial(&format!("ws://{}", addr)).await.unwrap();
        let rsp = conn.execute(&Request::eval("g.V()")).await.unwrap();
        assert_eq!(rsp.status.code, StatusCode::NoContent);

        conn.close().await.unwrap();
        server.await.unwrap();
    }
}
