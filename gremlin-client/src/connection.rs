//! Connection management.

use crate::error::ClientError;
use crate::inflight::InflightTable;
use crate::receiver::{self, Dispatcher};
use crate::sender::{self, SenderConfig};
use bytes::Bytes;
use futures::StreamExt;
use gremlin_protocol::{ContentType, Credentials, Encoder, Request, Response};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Default time allowed to write a message to the server.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(5);

/// Default time allowed between pongs from the server.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(10);

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum size of a received message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;

/// TLS configuration for `wss://` connections.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Enable the custom TLS configuration.
    pub enabled: bool,
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, webpki roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self.enabled = true;
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self.enabled = true;
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self.enabled = true;
        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Time allowed to write a message.
    pub write_wait: Duration,
    /// Time allowed to read the next pong.
    pub pong_wait: Duration,
    /// Keepalive ping period. Must be less than `pong_wait`.
    pub ping_period: Duration,
    /// WebSocket handshake timeout.
    pub handshake_timeout: Duration,
    /// Per-request deadline (optional).
    pub request_timeout: Option<Duration>,
    /// Content type announced on every request.
    pub content_type: ContentType,
    /// Credentials used to answer authentication challenges.
    pub credentials: Option<Credentials>,
    /// Maximum size of a received message.
    pub max_message_size: usize,
    /// TLS configuration (optional).
    pub tls: Option<TlsClientConfig>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self {
            write_wait: DEFAULT_WRITE_WAIT,
            pong_wait: DEFAULT_PONG_WAIT,
            ping_period: ping_period_for(DEFAULT_PONG_WAIT),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: None,
            content_type: ContentType::default(),
            credentials: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            tls: None,
        }
    }

    pub fn with_write_wait(mut self, wait: Duration) -> Self {
        self.write_wait = wait;
        self
    }

    /// Sets the liveness timeout and derives the ping period from it.
    pub fn with_pong_wait(mut self, wait: Duration) -> Self {
        self.pong_wait = wait;
        self.ping_period = ping_period_for(wait);
        self
    }

    /// Sets the ping period, clamped below the liveness timeout.
    pub fn with_ping_period(mut self, period: Duration) -> Self {
        self.ping_period = period.min(ping_period_for(self.pong_wait));
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Pings go out at 90% of the liveness timeout.
fn ping_period_for(pong_wait: Duration) -> Duration {
    pong_wait.mul_f64(0.9)
}

/// A multiplexed connection to a Gremlin server.
///
/// Any number of requests may be inflight at once; responses are matched to
/// their callers by request id, in whatever order the server sends them.
pub struct Conn {
    encoder: Encoder,
    request_timeout: Option<Duration>,
    /// Single-slot handoff to the sender.
    outbound: mpsc::Sender<Bytes>,
    inflight: Arc<InflightTable>,
    /// Shared by sender and receiver; cancelled when either stops.
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Conn {
    /// Starts the sender and receiver over an established WebSocket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(ws: WebSocketStream<S>, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::channel(1);
        let inflight = Arc::new(InflightTable::new());
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        let encoder = Encoder::new(config.content_type.clone());

        let sender_config = SenderConfig {
            write_wait: config.write_wait,
            ping_period: config.ping_period,
        };
        let token = shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = sender::run(sink, outbound_rx, token, sender_config).await {
                tracing::warn!("connection sender failed: {}", e);
            }
        });

        let dispatcher = Dispatcher {
            inflight: inflight.clone(),
            outbound: outbound.clone(),
            encoder: encoder.clone(),
            credentials: config.credentials.clone().unwrap_or_default(),
            shutdown: shutdown.clone(),
            tasks: tasks.clone(),
        };
        let pong_wait = config.pong_wait;
        tasks.spawn(async move {
            if let Err(e) = receiver::run(stream, dispatcher, pong_wait).await {
                tracing::warn!("connection receiver failed: {}", e);
            }
        });

        Self {
            encoder,
            request_timeout: config.request_timeout,
            outbound,
            inflight,
            shutdown,
            tasks,
        }
    }

    /// Executes a request and waits for its final response.
    ///
    /// Error statuses are returned as responses; inspect
    /// [`Response::is_err`] to tell them apart. Dropping the returned future
    /// abandons the request.
    pub async fn execute(&self, request: &Request) -> Result<Response, ClientError> {
        self.execute_with(request, &CancellationToken::new()).await
    }

    /// Executes a request, giving up with [`ClientError::Cancelled`] once
    /// `cancel` fires.
    ///
    /// A response arriving after cancellation is discarded.
    pub async fn execute_with(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError> {
        let id = request.request_id.as_str();
        let mut registration = self.inflight.register(id)?;

        let mut frame = Some(self.encoder.encode_request(request)?);
        let deadline = self.request_timeout.map(|timeout| Instant::now() + timeout);
        tracing::trace!("executing request id={} op={}", id, request.operation);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ClientError::ConnectionClosed),
                _ = cancel.cancelled() => {
                    tracing::trace!("request id={} cancelled", id);
                    return Err(ClientError::Cancelled);
                }
                _ = expire(deadline) => {
                    tracing::trace!("request id={} timed out", id);
                    return Err(ClientError::Timeout);
                }
                sent = handoff(&self.outbound, frame.as_ref()), if frame.is_some() => {
                    sent?;
                    frame = None;
                }
                outcome = &mut registration.result => {
                    return outcome.unwrap_or(Err(ClientError::ConnectionClosed));
                }
            }
        }
    }

    /// Closes the connection, failing every pending request.
    ///
    /// Waits until the sender, the receiver and any authentication tasks have
    /// stopped. Safe to call more than once.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::debug!("Connection closed");
        Ok(())
    }

    /// Returns whether the connection is shutting down or closed.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Returns the number of requests waiting for a response.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handoff(
    outbound: &mpsc::Sender<Bytes>,
    frame: Option<&Bytes>,
) -> Result<(), ClientError> {
    match frame {
        Some(frame) => outbound
            .send(frame.clone())
            .await
            .map_err(|_| ClientError::ConnectionClosed),
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
