//! # gremlin-client
//!
//! Multiplexed WebSocket client for Gremlin servers.
//!
//! One [`Conn`] carries any number of concurrent requests. A sender task owns
//! the write half of the socket and a receiver task owns the read half;
//! responses are routed back to callers by request id.
//!
//! This crate provides:
//! - Request correlation over a single connection
//! - Reassembly of partial (fragmented) results
//! - SASL PLAIN answers to authentication challenges
//! - Keepalive pings and liveness timeouts
//! - Optional TLS support
//!
//! ```no_run
//! # async fn run() -> Result<(), gremlin_client::ClientError> {
//! use gremlin_client::Dialer;
//! use gremlin_protocol::Request;
//!
//! let conn = Dialer::default()
//!     .with_credentials("user", "secret")
//!     .dial("ws://localhost:8182/gremlin")
//!     .await?;
//! let rsp = conn.execute(&Request::eval("g.V().count()")).await?;
//! println!("{}", rsp.status.code);
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod dialer;
pub mod error;
mod inflight;
mod receiver;
mod sender;
pub mod tls;

pub use connection::{Conn, ConnectionConfig, TlsClientConfig};
pub use dialer::{dial, Dialer};
pub use error::ClientError;
pub use tokio_util::sync::CancellationToken;
