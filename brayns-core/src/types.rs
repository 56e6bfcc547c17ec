//! JSON-RPC 2.0 messages exchanged with a Brayns engine
//!
//! The client only ever sends requests (and notifications, i.e. requests
//! without an id). The engine sends three kinds of messages back:
//!
//! 1. **Reply**: the successful result of one request
//! 2. **Error**: the failure of one request
//! 3. **Progress**: a `progress` notification reporting how far a long
//!    running request has gone; it never resolves the request
//!
//! Incoming messages are modelled by the tagged union [`JsonRpcMessage`] so
//! that the dispatch site matches exhaustively on them.
//!
//! # Binary payloads
//!
//! Some engine methods (snapshots, mesh uploads) attach raw bytes to a request
//! or reply. These bytes are never part of the JSON; they travel in the tail of
//! a binary [`Frame`] and are stored in the `binary` field of the message.

use crate::error::JsonRpcErrorData;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Method name of the progress notifications sent by the engine
pub const PROGRESS_METHOD: &str = "progress";

/// Method name used to ask the engine to cancel a running request
pub const CANCEL_METHOD: &str = "cancel";

/// JSON-RPC protocol version carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Correlation id of a request
///
/// Brayns accepts string and integer ids. An absent id (`Option<Id>::None`)
/// turns a request into a notification.
///
/// ```rust
/// use brayns_core::Id;
///
/// let id1: Id = "abc".into();
/// let id2: Id = 42i64.into();
///
/// assert_eq!(id1.to_string(), "\"abc\"");
/// assert_eq!(id2.to_string(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric id, the kind allocated by an instance
    Number(i64),
    /// String id
    String(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<u64> for Id {
    /// Values above `i64::MAX` wrap around.
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

/// Raw unit of data carried by a transport
///
/// Text frames hold one JSON message. Binary frames hold a 4-byte
/// little-endian length, that many bytes of UTF-8 JSON, and a binary tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Pure JSON message
    Text(String),
    /// Length-prefixed JSON followed by a binary payload
    Binary(Vec<u8>),
}

impl Frame {
    /// Size of the frame in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    /// Whether the frame carries no data at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a binary frame
    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }
}

/// Request sent to the engine
///
/// `id` and `params` are omitted from the JSON when absent (they are never
/// written as `null`), which keeps notifications distinguishable from
/// requests.
///
/// ```rust
/// use brayns_core::{Id, JsonRpcRequest};
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("snapshot", Some(json!({"path": "out.png"})), Id::Number(1));
/// assert!(!request.is_notification());
///
/// let notification = JsonRpcRequest::notification("cancel", Some(json!({"id": 1})));
/// assert!(notification.is_notification());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version, always "2.0"
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Correlation id; `None` for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    /// Engine method to invoke
    pub method: String,
    /// Method parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Binary payload sent in the tail of a binary frame
    #[serde(skip)]
    pub binary: Vec<u8>,
}

impl JsonRpcRequest {
    /// Create a request expecting a reply
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>, id: Id) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(id),
            method: method.into(),
            params,
            binary: Vec::new(),
        }
    }

    /// Create a notification (no id, no reply)
    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: None,
            method: method.into(),
            params,
            binary: Vec::new(),
        }
    }

    /// Attach a binary payload
    pub fn with_binary(mut self, binary: impl Into<Vec<u8>>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Whether the request expects no reply
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Successful reply to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcReply {
    /// JSON-RPC version, always "2.0"
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Id of the request being answered
    pub id: Id,
    /// Method result (may be `null`)
    #[serde(default)]
    pub result: serde_json::Value,
    /// Binary payload from the tail of a binary frame
    #[serde(skip)]
    pub binary: Vec<u8>,
}

impl JsonRpcReply {
    /// Create a reply without binary payload
    pub fn new(id: Id, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result,
            binary: Vec::new(),
        }
    }

    /// Attach a binary payload
    pub fn with_binary(mut self, binary: impl Into<Vec<u8>>) -> Self {
        self.binary = binary.into();
        self
    }
}

/// Failed reply to one request
///
/// `id` is `None` when the engine could not work out which request failed
/// (typically a parse error); such errors cannot be routed to a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC version, always "2.0"
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Id of the failed request
    #[serde(default)]
    pub id: Option<Id>,
    /// Error details
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Create an error reply
    pub fn new(id: Option<Id>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            error,
        }
    }
}

/// Progress of a running request
///
/// This is the `params` object of a `progress` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcProgress {
    /// Id of the request making progress
    pub id: Id,
    /// Human-readable name of the current phase
    pub operation: String,
    /// Completion ratio in `[0, 1]`
    pub amount: f64,
}

impl JsonRpcProgress {
    /// Create a progress event
    pub fn new(id: Id, operation: impl Into<String>, amount: f64) -> Self {
        Self {
            id,
            operation: operation.into(),
            amount,
        }
    }
}

/// Any message the engine can send to the client
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// Terminal success for one request
    Reply(JsonRpcReply),
    /// Terminal failure for one request
    Error(JsonRpcError),
    /// Non-terminal progress for one request
    Progress(JsonRpcProgress),
}

impl JsonRpcMessage {
    /// Id the message refers to, if any
    pub fn id(&self) -> Option<&Id> {
        match self {
            JsonRpcMessage::Reply(reply) => Some(&reply.id),
            JsonRpcMessage::Error(error) => error.id.as_ref(),
            JsonRpcMessage::Progress(progress) => Some(&progress.id),
        }
    }

    /// Whether the message resolves its request
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JsonRpcMessage::Progress(_))
    }
}
