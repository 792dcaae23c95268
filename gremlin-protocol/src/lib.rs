//! # gremlin-protocol
//!
//! Wire protocol for talking to a Gremlin server over a WebSocket.
//!
//! This crate provides:
//! - Content-type frame header written ahead of every outbound request
//! - JSON request/response envelope types
//! - Status codes and SASL credentials
//! - Fragment decoding/reassembly helpers for partial responses

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::{ProtocolError, ResponseError};
pub use frame::{ContentType, Frame, GRAPHSON_V3_MIME, MAX_CONTENT_TYPE_LEN};
pub use message::{Credentials, Request, Response, ResponseResult, Status, StatusCode};
