//! JSON message types for Gremlin requests and responses.

use crate::error::{ProtocolError, ResponseError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::fmt;

/// Operation names.
pub mod ops {
    /// Evaluate a script.
    pub const EVAL: &str = "eval";
    /// Answer an authentication challenge.
    pub const AUTHENTICATION: &str = "authentication";
}

/// Well-known argument keys.
pub mod args {
    pub const GREMLIN: &str = "gremlin";
    pub const LANGUAGE: &str = "language";
    pub const BINDINGS: &str = "bindings";
    pub const SASL: &str = "sasl";
    pub const SASL_MECHANISM: &str = "saslMechanism";
}

/// Script language sent with eval requests.
pub const DEFAULT_LANGUAGE: &str = "gremlin-groovy";

/// SASL mechanism used to answer authentication challenges.
pub const SASL_PLAIN: &str = "PLAIN";

/// Request message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for correlation.
    #[serde(rename = "requestId")]
    pub request_id: String,

    /// Operation to perform.
    #[serde(rename = "op")]
    pub operation: String,

    /// Server-side processor, empty for the default one.
    #[serde(default)]
    pub processor: String,

    /// Operation-specific arguments.
    #[serde(rename = "args", default)]
    pub arguments: Map<String, Value>,
}

impl Request {
    pub fn new(request_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            operation: operation.into(),
            processor: String::new(),
            arguments: Map::new(),
        }
    }

    /// Creates an eval request with a fresh random request id.
    pub fn eval(query: impl Into<String>) -> Self {
        let query: String = query.into();
        Self::new(uuid::Uuid::new_v4().to_string(), ops::EVAL)
            .with_argument(args::GREMLIN, query)
            .with_argument(args::LANGUAGE, DEFAULT_LANGUAGE)
    }

    /// Creates an eval request with parameter bindings.
    pub fn eval_with_bindings(query: impl Into<String>, bindings: Map<String, Value>) -> Self {
        Self::eval(query).with_argument(args::BINDINGS, Value::Object(bindings))
    }

    /// Creates the authentication answer for a challenged request.
    pub fn auth(request_id: impl Into<String>, credentials: &Credentials) -> Self {
        Self::new(request_id, ops::AUTHENTICATION)
            .with_argument(args::SASL, credentials.encode())
            .with_argument(args::SASL_MECHANISM, SASL_PLAIN)
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Response status codes.
///
/// Codes the protocol does not define are kept verbatim in [`StatusCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum StatusCode {
    Success,
    NoContent,
    PartialContent,
    Unauthorized,
    Authenticate,
    MalformedRequest,
    InvalidRequestArguments,
    ServerError,
    ScriptEvaluationError,
    ServerTimeout,
    ServerSerializationError,
    Unknown(i32),
}

impl StatusCode {
    /// Returns the numeric wire code.
    pub fn code(&self) -> i32 {
        match self {
            StatusCode::Success => 200,
            StatusCode::NoContent => 204,
            StatusCode::PartialContent => 206,
            StatusCode::Unauthorized => 401,
            StatusCode::Authenticate => 407,
            StatusCode::MalformedRequest => 498,
            StatusCode::InvalidRequestArguments => 499,
            StatusCode::ServerError => 500,
            StatusCode::ScriptEvaluationError => 597,
            StatusCode::ServerTimeout => 598,
            StatusCode::ServerSerializationError => 599,
            StatusCode::Unknown(code) => *code,
        }
    }

    /// Returns whether this status reports a failure.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            StatusCode::Success | StatusCode::NoContent | StatusCode::PartialContent
        )
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        match code {
            200 => StatusCode::Success,
            204 => StatusCode::NoContent,
            206 => StatusCode::PartialContent,
            401 => StatusCode::Unauthorized,
            407 => StatusCode::Authenticate,
            498 => StatusCode::MalformedRequest,
            499 => StatusCode::InvalidRequestArguments,
            500 => StatusCode::ServerError,
            597 => StatusCode::ScriptEvaluationError,
            598 => StatusCode::ServerTimeout,
            599 => StatusCode::ServerSerializationError,
            other => StatusCode::Unknown(other),
        }
    }
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        code.code()
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Unknown(0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Success => write!(f, "SUCCESS"),
            StatusCode::NoContent => write!(f, "NO_CONTENT"),
            StatusCode::PartialContent => write!(f, "PARTIAL_CONTENT"),
            StatusCode::Unauthorized => write!(f, "UNAUTHORIZED"),
            StatusCode::Authenticate => write!(f, "AUTHENTICATE"),
            StatusCode::MalformedRequest => write!(f, "MALFORMED_REQUEST"),
            StatusCode::InvalidRequestArguments => write!(f, "INVALID_REQUEST_ARGUMENTS"),
            StatusCode::ServerError => write!(f, "SERVER_ERROR"),
            StatusCode::ScriptEvaluationError => write!(f, "SCRIPT_EVALUATION_ERROR"),
            StatusCode::ServerTimeout => write!(f, "SERVER_TIMEOUT"),
            StatusCode::ServerSerializationError => write!(f, "SERVER_SERIALIZATION_ERROR"),
            StatusCode::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// Response status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: StatusCode,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

/// Response result: opaque data plus server metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseResult {
    /// Result payload, left undecoded.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

/// Response message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response correlates to. Empty when the server sent
    /// none, e.g. for a request it could not parse.
    #[serde(rename = "requestId", default, deserialize_with = "null_as_empty")]
    pub request_id: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub result: ResponseResult,
}

impl Response {
    pub fn new(request_id: impl Into<String>, code: StatusCode) -> Self {
        Self {
            request_id: request_id.into(),
            status: Status {
                code,
                ..Status::default()
            },
            result: ResponseResult::default(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status.message = message.into();
        self
    }

    pub fn with_data(mut self, data: Box<RawValue>) -> Self {
        self.result.data = Some(data);
        self
    }

    /// Returns whether the response carries an error status.
    pub fn is_err(&self) -> bool {
        self.status.code.is_error()
    }

    /// Returns the error status as an error value, if any.
    pub fn err(&self) -> Option<ResponseError> {
        if !self.is_err() {
            return None;
        }
        Some(ResponseError {
            code: self.status.code,
            message: self.status.message.clone(),
        })
    }

    /// Decodes the result data into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<Option<T>, ProtocolError> {
        match &self.result.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// SASL PLAIN credentials.
///
/// The text form is the base64 encoding of `\0username\0password`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Encodes the credentials into their base64 text form.
    pub fn encode(&self) -> String {
        let mut plain = Vec::with_capacity(2 + self.username.len() + self.password.len());
        plain.push(0);
        plain.extend_from_slice(self.username.as_bytes());
        plain.push(0);
        plain.extend_from_slice(self.password.as_bytes());
        BASE64.encode(plain)
    }

    /// Parses credentials from their base64 text form.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let plain = BASE64
            .decode(text)
            .map_err(|e| ProtocolError::InvalidCredentials(e.to_string()))?;

        let mut parts = plain.splitn(3, |&b| b == 0);
        let (Some(_authzid), Some(username), Some(password)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::InvalidCredentials(
                "missing separator".to_string(),
            ));
        };

        Ok(Self {
            username: String::from_utf8(username.to_vec())
                .map_err(|_| ProtocolError::InvalidUtf8)?,
            password: String::from_utf8(password.to_vec())
                .map_err(|_| ProtocolError::InvalidUtf8)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Credentials::decode(&text).map_err(serde::de::Error::custom)
    }
}
