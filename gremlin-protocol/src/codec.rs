//! Encoder and decoder for Gremlin messages.

use crate::error::ProtocolError;
use crate::frame::{ContentType, Frame};
use crate::message::{Request, Response};
use bytes::Bytes;
use serde_json::value::RawValue;

/// Encodes requests into framed messages.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    content_type: ContentType,
}

impl Encoder {
    pub fn new(content_type: ContentType) -> Self {
        Self { content_type }
    }

    /// Encodes a request body and prefixes it with the content type header.
    pub fn encode_request(&self, request: &Request) -> Result<Bytes, ProtocolError> {
        let payload = serde_json::to_vec(request)?;
        Ok(Frame::new(self.content_type.clone(), Bytes::from(payload)).encode())
    }

    /// Encodes a response body. Responses travel without a header.
    pub fn encode_response(response: &Response) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(response)?))
    }
}

/// Decodes received messages.
pub struct Decoder;

impl Decoder {
    /// Decodes a response from a bare message body.
    pub fn decode_response(data: &[u8]) -> Result<Response, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Decodes a framed request, returning its content type alongside.
    pub fn decode_request(data: &[u8]) -> Result<(ContentType, Request), ProtocolError> {
        let frame = Frame::decode(data)?;
        let request = serde_json::from_slice(&frame.payload)?;
        Ok((frame.content_type, request))
    }
}

/// Splitting and joining of fragmented results.
///
/// A partial response carries a sequence of elements; the full result is the
/// concatenation of every fragment's elements in arrival order.
pub mod fragments {
    use super::*;

    /// Decodes one fragment into its elements. Missing data is an empty fragment.
    pub fn split(data: Option<&RawValue>) -> Result<Vec<Box<RawValue>>, ProtocolError> {
        let Some(raw) = data else {
            return Ok(Vec::new());
        };
        if !raw.get().trim_start().starts_with('[') {
            return Err(ProtocolError::FragmentNotSequence);
        }
        Ok(serde_json::from_str(raw.get())?)
    }

    /// Re-encodes accumulated elements as a single sequence.
    pub fn join(elements: &[Box<RawValue>]) -> Result<Box<RawValue>, ProtocolError> {
        Ok(serde_json::value::to_raw_value(elements)?)
    }
}
