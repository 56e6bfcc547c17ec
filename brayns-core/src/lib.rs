//! Core JSON-RPC 2.0 types and frame codec for the Brayns SDK
//!
//! A Brayns engine is driven through JSON-RPC 2.0 messages exchanged over
//! WebSocket frames. This crate holds everything that does not depend on a
//! live connection:
//!
//! - **Types**: requests, replies, errors, progress events and frames
//! - **Codec**: text and length-prefixed binary frame encoding/decoding
//! - **Errors**: the SDK-wide error taxonomy
//! - **Observability**: `tracing` and OpenTelemetry bootstrap
//!
//! # Example
//!
//! ```rust
//! use brayns_core::{codec, Frame, Id, JsonRpcMessage, JsonRpcRequest};
//! use serde_json::json;
//!
//! let params = json!({"path": "frame.png"});
//! let request = JsonRpcRequest::new("snapshot", Some(params), Id::Number(2));
//! let frame = codec::encode_request(&request).unwrap();
//! assert!(matches!(frame, Frame::Text(_)));
//!
//! let progress = json!({
//!     "jsonrpc": "2.0",
//!     "method": "progress",
//!     "params": {"id": 2, "operation": "Rendering", "amount": 0.5}
//! });
//! let progress = Frame::Text(progress.to_string());
//! assert!(matches!(codec::decode(&progress).unwrap(), JsonRpcMessage::Progress(_)));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Frame, Id, JsonRpcError, JsonRpcMessage, JsonRpcProgress, JsonRpcReply, JsonRpcRequest,
    CANCEL_METHOD, JSONRPC_VERSION, PROGRESS_METHOD,
};
