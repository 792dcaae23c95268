//! Outbound frame layout.
//!
//! Every request sent to the server is a single binary WebSocket message
//! prefixed with the content type of its body:
//!
//! ```text
//! +----------+--------------------+-------------------------+
//! | mime_len | mime               | payload                 |
//! | 1 byte   | mime_len bytes     | remaining bytes         |
//! +----------+--------------------+-------------------------+
//! ```
//!
//! Responses carry no header; the server answers with the bare body.

use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// GraphSON 3.0 JSON content type.
pub const GRAPHSON_V3_MIME: &str = "application/vnd.gremlin-v3.0+json";

/// Longest content type that fits the one byte length prefix.
pub const MAX_CONTENT_TYPE_LEN: usize = u8::MAX as usize;

/// A validated content type together with its pre-encoded header bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    header: Bytes,
}

impl ContentType {
    /// Creates a content type, rejecting non-ASCII or overlong strings.
    pub fn new(mime: &str) -> Result<Self, ProtocolError> {
        if mime.len() > MAX_CONTENT_TYPE_LEN || !mime.is_ascii() {
            return Err(ProtocolError::InvalidContentType(mime.to_string()));
        }

        Ok(Self {
            header: encode_header(mime),
        })
    }

    /// The GraphSON 3.0 JSON content type.
    pub fn graphson_v3() -> Self {
        Self {
            header: encode_header(GRAPHSON_V3_MIME),
        }
    }

    /// Returns the mime string.
    pub fn as_str(&self) -> &str {
        // Validated as ASCII on construction.
        std::str::from_utf8(&self.header[1..]).unwrap_or_default()
    }

    /// Returns the length-prefixed header bytes.
    pub fn header(&self) -> &[u8] {
        &self.header
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::graphson_v3()
    }
}

fn encode_header(mime: &str) -> Bytes {
    let mut header = BytesMut::with_capacity(1 + mime.len());
    header.put_u8(mime.len() as u8);
    header.put_slice(mime.as_bytes());
    header.freeze()
}

/// A single outbound message: content type header plus body.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Content type of the payload.
    pub content_type: ContentType,
    /// Encoded request body.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(content_type: ContentType, payload: Bytes) -> Self {
        Self {
            content_type,
            payload,
        }
    }

    /// Encodes the frame into a single contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let header = self.content_type.header();
        let mut buf = BytesMut::with_capacity(header.len() + self.payload.len());
        buf.put_slice(header);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Splits a received message back into content type and payload.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let Some((&len, rest)) = data.split_first() else {
            return Err(ProtocolError::TruncatedFrame {
                needed: 1,
                available: 0,
            });
        };

        let len = len as usize;
        if rest.len() < len {
            return Err(ProtocolError::TruncatedFrame {
                needed: len,
                available: rest.len(),
            });
        }

        let mime = std::str::from_utf8(&rest[..len]).map_err(|_| ProtocolError::InvalidUtf8)?;
        let content_type = ContentType::new(mime)?;

        Ok(Self {
            content_type,
            payload: Bytes::copy_from_slice(&rest[len..]),
        })
    }
}
