//! Error types for the Brayns SDK
//!
//! Two error types live here:
//!
//! - **Error**: everything a caller of the SDK can observe (uses thiserror)
//! - **JsonRpcErrorData**: the wire-format error object sent by the engine
//!
//! # Propagation
//!
//! Errors that can be attributed to one request (remote failures, timeouts,
//! cancellation, disconnection) are delivered to the caller owning that
//! request and to nobody else. Frames that cannot be attributed to a caller
//! (`ProtocolDecode`, unknown ids) are logged and dropped by the receive loop.
//!
//! `Error` is `Clone` because a single disconnection resolves every pending
//! request with the same `ConnectionClosed` value.
//!
//! # Examples
//!
//! ```rust
//! use brayns_core::{Error, JsonRpcErrorData};
//!
//! let remote = Error::Remote(JsonRpcErrorData::new(1, "failed"));
//! assert_eq!(remote.remote_code(), Some(1));
//! ```

use crate::types::Id;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for Brayns SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the Brayns SDK
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A frame could not be decoded into a reply, an error or a progress event
    ///
    /// Raised by the codec for malformed JSON, an unexpected message shape or a
    /// truncated binary frame. The connection stays open.
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// The id is already used by a request still in flight
    ///
    /// This is a programming error on the caller side and fails fast.
    #[error("Request id {0} is already in flight")]
    DuplicateId(Id),

    /// The engine answered the request with a JSON-RPC error
    #[error("Remote error: {0}")]
    Remote(#[from] JsonRpcErrorData),

    /// The request did not complete within the client-side budget
    ///
    /// The request has been cancelled (locally and remotely) when this is
    /// returned.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection to the engine is closed
    ///
    /// Returned for every request still pending when the transport closes and
    /// for any request attempted on a closed instance.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The request was cancelled locally before a reply arrived
    #[error("Request cancelled")]
    Cancelled,

    /// The connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// WebSocket transport layer error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization or deserialization of a payload failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal failure (e.g. a dropped channel)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Remote error code, if this error was produced by the engine
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Error::Remote(data) => Some(data.code),
            _ => None,
        }
    }

    /// Whether the error means the instance can no longer be used
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// JSON-RPC 2.0 error object as sent by the engine
///
/// Appears in the `error` member of a failed reply. `code` and `message` are
/// mandatory, `data` carries engine-specific details (for instance the list
/// of invalid parameters).
///
/// ```rust
/// use brayns_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let error = JsonRpcErrorData::with_data(-32602, "Invalid params", json!(["width"]));
/// assert_eq!(error.to_string(), "[-32602] Invalid params");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code
    pub code: i64,

    /// Short human-readable description
    pub message: String,

    /// Optional engine-specific details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Create an error object with code and message
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error object carrying additional data
    pub fn with_data(code: i64, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(-32601, format!("Method not found: {}", method.into()))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
