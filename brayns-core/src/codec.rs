//! Frame codec for JSON-RPC messages
//!
//! Turns requests into transport frames and transport frames into
//! [`JsonRpcMessage`] values.
//!
//! # Frame formats
//!
//! - **Text**: one JSON object.
//! - **Binary**: a 4-byte little-endian unsigned length `n`, then `n` bytes
//!   of UTF-8 JSON, then an opaque binary payload running to the end of the
//!   frame. A request or reply with a non-empty binary payload is always sent
//!   as a binary frame.
//!
//! # Classification
//!
//! An incoming JSON object is a reply if it has a `result` member, an error
//! if it has an `error` member, and a progress event if its `method` is
//! `"progress"`. Anything else is reported as [`Error::ProtocolDecode`], never
//! dropped silently; whether to drop it is the caller's decision.
//!
//! # Examples
//!
//! ```rust
//! use brayns_core::{codec, Frame, Id, JsonRpcMessage, JsonRpcRequest};
//!
//! let request = JsonRpcRequest::new("get-version", None, Id::Number(1));
//! let frame = codec::encode_request(&request).unwrap();
//! assert_eq!(codec::decode_request(&frame).unwrap(), request);
//!
//! let reply = Frame::Text(r#"{"jsonrpc":"2.0","id":1,"result":{"major":1}}"#.into());
//! assert!(matches!(codec::decode(&reply).unwrap(), JsonRpcMessage::Reply(_)));
//! ```

use crate::error::{Error, Result};
use crate::types::{
    Frame, JsonRpcError, JsonRpcMessage, JsonRpcProgress, JsonRpcReply, JsonRpcRequest,
    PROGRESS_METHOD,
};
use serde::Serialize;
use serde_json::Value;

/// Size of the JSON length prefix of a binary frame
pub const BINARY_HEADER_SIZE: usize = 4;

/// Shape of an incoming message, decided before deserializing it
enum Kind {
    Reply,
    Error,
    Progress,
}

fn classify(value: &Value) -> Result<Kind> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::ProtocolDecode("message is not a JSON object".to_string()))?;

    if object.contains_key("result") {
        return Ok(Kind::Reply);
    }
    if object.contains_key("error") {
        return Ok(Kind::Error);
    }
    match object.get("method").and_then(Value::as_str) {
        Some(PROGRESS_METHOD) => Ok(Kind::Progress),
        Some(method) => Err(Error::ProtocolDecode(format!(
            "unsupported notification '{}'",
            method
        ))),
        None => Err(Error::ProtocolDecode(
            "message has no result, error or method".to_string(),
        )),
    }
}

/// Serialize a message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Build a binary frame from a JSON text and a binary payload
///
/// Fails if the JSON part does not fit in the 32-bit length prefix.
pub fn encode_binary(json: &str, binary: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(json.len()).map_err(|_| {
        let message = format!("JSON part too large for binary frame: {} bytes", json.len());
        Error::Serialization(message)
    })?;

    let mut data = Vec::with_capacity(BINARY_HEADER_SIZE + json.len() + binary.len());
    data.extend_from_slice(&size.to_le_bytes());
    data.extend_from_slice(json.as_bytes());
    data.extend_from_slice(binary);
    Ok(data)
}

/// Split a binary frame into its JSON text and binary tail
///
/// # Errors
///
/// `Error::ProtocolDecode` if the frame is shorter than the length prefix, if
/// the announced length runs past the end of the frame, or if the JSON part is
/// not valid UTF-8.
pub fn split_binary(data: &[u8]) -> Result<(&str, &[u8])> {
    if data.len() < BINARY_HEADER_SIZE {
        return Err(Error::ProtocolDecode(format!(
            "binary frame too short for length prefix: {} bytes",
            data.len()
        )));
    }

    let (header, body) = data.split_at(BINARY_HEADER_SIZE);
    let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if size > body.len() {
        return Err(Error::ProtocolDecode(format!(
            "binary frame announces {} bytes of JSON but only {} are available",
            size,
            body.len()
        )));
    }

    let (json, binary) = body.split_at(size);
    let json = std::str::from_utf8(json)
        .map_err(|e| Error::ProtocolDecode(format!("JSON part is not UTF-8: {}", e)))?;
    Ok((json, binary))
}

fn frame_from(json: String, binary: &[u8]) -> Result<Frame> {
    if binary.is_empty() {
        Ok(Frame::Text(json))
    } else {
        encode_binary(&json, binary).map(Frame::Binary)
    }
}

/// Encode a request (or notification) to a frame
///
/// The frame is binary exactly when the request carries a binary payload.
pub fn encode_request(request: &JsonRpcRequest) -> Result<Frame> {
    frame_from(encode(request)?, &request.binary)
}

/// Decode a request frame, the inverse of [`encode_request`]
pub fn decode_request(frame: &Frame) -> Result<JsonRpcRequest> {
    let (json, binary) = split_frame(frame)?;
    let mut request: JsonRpcRequest = serde_json::from_str(json)
        .map_err(|e| Error::ProtocolDecode(format!("invalid request: {}", e)))?;
    request.binary = binary.to_vec();
    Ok(request)
}

/// Encode a reply to a frame
pub fn encode_reply(reply: &JsonRpcReply) -> Result<Frame> {
    frame_from(encode(reply)?, &reply.binary)
}

/// Encode an error reply to a text frame
pub fn encode_error(error: &JsonRpcError) -> Result<Frame> {
    encode(error).map(Frame::Text)
}

/// Encode a progress event as a `progress` notification
pub fn encode_progress(progress: &JsonRpcProgress) -> Result<Frame> {
    let params = serde_json::to_value(progress).map_err(|e| Error::Serialization(e.to_string()))?;
    encode_request(&JsonRpcRequest::notification(PROGRESS_METHOD, Some(params)))
}

fn split_frame(frame: &Frame) -> Result<(&str, &[u8])> {
    match frame {
        Frame::Text(text) => Ok((text.as_str(), &[])),
        Frame::Binary(data) => split_binary(data),
    }
}

/// Decode an incoming frame into a reply, an error or a progress event
///
/// # Errors
///
/// `Error::ProtocolDecode` for invalid JSON, a truncated binary frame, or a
/// message that is none of the three supported kinds.
pub fn decode(frame: &Frame) -> Result<JsonRpcMessage> {
    let (json, binary) = split_frame(frame)?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::ProtocolDecode(format!("invalid JSON: {}", e)))?;

    match classify(&value)? {
        Kind::Reply => {
            let mut reply: JsonRpcReply = serde_json::from_value(value)
                .map_err(|e| Error::ProtocolDecode(format!("invalid reply: {}", e)))?;
            reply.binary = binary.to_vec();
            Ok(JsonRpcMessage::Reply(reply))
        }
        Kind::Error => {
            if !binary.is_empty() {
                tracing::debug!(size = binary.len(), "Ignoring binary payload attached to error");
            }
            let error: JsonRpcError = serde_json::from_value(value)
                .map_err(|e| Error::ProtocolDecode(format!("invalid error reply: {}", e)))?;
            Ok(JsonRpcMessage::Error(error))
        }
        Kind::Progress => {
            if !binary.is_empty() {
                tracing::debug!(
                    size = binary.len(),
                    "Ignoring binary payload attached to progress"
                );
            }
            let params = value
                .get("params")
                .cloned()
                .ok_or_else(|| Error::ProtocolDecode("progress without params".to_string()))?;
            let progress: JsonRpcProgress = serde_json::from_value(params)
                .map_err(|e| Error::ProtocolDecode(format!("invalid progress: {}", e)))?;
            Ok(JsonRpcMessage::Progress(progress))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JsonRpcErrorData;
    use crate::types::Id;
    use serde_json::json;

    fn text(value: Value) -> Frame {
        Frame::Text(value.to_string())
    }

    #[test]
    fn test_notification_never_has_id() {
        for params in [None, Some(json!({})), Some(json!([1, 2]))] {
            let frame = encode_request(&JsonRpcRequest::notification("cancel", params)).unwrap();
            let Frame::Text(json) = frame else {
                panic!("Expected text frame");
            };
            let value: Value = serde_json::from_str(&json).unwrap();
            assert!(value.get("id").is_none(), "unexpected id in {}", json);
        }
    }

    #[test]
    fn test_absent_params_not_emitted_as_null() {
        let request = JsonRpcRequest::new("get-version", None, Id::Number(0));
        let frame = encode_request(&request).unwrap();
        assert_eq!(
            frame,
            Frame::Text(r#"{"jsonrpc":"2.0","id":0,"method":"get-version"}"#.to_string())
        );
    }

    #[test]
    fn test_request_round_trip() {
        let ids = [None, Some(Id::Number(0)), Some(Id::Number(42)), Some(Id::from("abc"))];
        let params = [None, Some(json!({})), Some(json!({"a": 1})), Some(json!([1, 2, 3]))];

        for id in &ids {
            for params in &params {
                let request = JsonRpcRequest {
                    id: id.clone(),
                    params: params.clone(),
                    ..JsonRpcRequest::notification("test", None)
                };
                let decoded = decode_request(&encode_request(&request).unwrap()).unwrap();
                assert_eq!(decoded, request);
            }
        }
    }

    #[test]
    fn test_binary_request_round_trip() {
        let request =
            JsonRpcRequest::new("upload-model", Some(json!({"type": "ply"})), Id::Number(9))
                .with_binary(vec![0xde, 0xad, 0xbe, 0xef]);

        let frame = encode_request(&request).unwrap();
        assert!(frame.is_binary());
        assert_eq!(decode_request(&frame).unwrap(), request);
    }

    #[test]
    fn test_decode_reply() {
        let frame = text(json!({"jsonrpc": "2.0", "id": 1, "result": {"major": 1}}));
        let message = decode(&frame).unwrap();

        match message {
            JsonRpcMessage::Reply(reply) => {
                assert_eq!(reply.id, Id::Number(1));
                assert_eq!(reply.result, json!({"major": 1}));
                assert!(reply.binary.is_empty());
            }
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_null_result_is_reply() {
        let message = decode(&text(json!({"id": 4, "result": null}))).unwrap();
        assert_eq!(
            message,
            JsonRpcMessage::Reply(JsonRpcReply::new(Id::Number(4), Value::Null))
        );
    }

    #[test]
    fn test_decode_error() {
        let message = decode(&text(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": 1, "message": "failed", "data": ["x"]}
        })))
        .unwrap();

        match message {
            JsonRpcMessage::Error(error) => {
                assert_eq!(error.id, Some(Id::Number(2)));
                assert_eq!(error.error, JsonRpcErrorData::with_data(1, "failed", json!(["x"])));
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_progress() {
        let message = decode(&text(json!({
            "jsonrpc": "2.0",
            "method": "progress",
            "params": {"id": "abc", "operation": "Loading model", "amount": 0.3}
        })))
        .unwrap();

        assert_eq!(
            message,
            JsonRpcMessage::Progress(JsonRpcProgress::new(Id::from("abc"), "Loading model", 0.3))
        );
    }

    #[test]
    fn test_progress_encode_decode() {
        let progress = JsonRpcProgress::new(Id::Number(2), "Rendering", 0.7);
        let message = decode(&encode_progress(&progress).unwrap()).unwrap();
        assert_eq!(message, JsonRpcMessage::Progress(progress));
    }

    #[test]
    fn test_decode_binary_reply_attaches_tail() {
        let reply = JsonRpcReply::new(Id::Number(3), json!({"format": "png"}))
            .with_binary(b"PNGDATA".to_vec());
        let frame = encode_reply(&reply).unwrap();

        assert_eq!(decode(&frame).unwrap(), JsonRpcMessage::Reply(reply));
    }

    #[test]
    fn test_decode_binary_frame_without_tail() {
        let json = r#"{"id":3,"result":true}"#;
        let frame = Frame::Binary(encode_binary(json, &[]).unwrap());

        match decode(&frame).unwrap() {
            JsonRpcMessage::Reply(reply) => assert!(reply.binary.is_empty()),
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_split_binary_layout() {
        let data = encode_binary("{}", &[7, 8]).unwrap();
        assert_eq!(&data[..4], &[2, 0, 0, 0]);

        let (json, tail) = split_binary(&data).unwrap();
        assert_eq!(json, "{}");
        assert_eq!(tail, &[7, 8]);
    }

    #[test]
    fn test_split_binary_truncated() {
        assert!(matches!(split_binary(&[1, 0]), Err(Error::ProtocolDecode(_))));

        let mut data = encode_binary(r#"{"id":1}"#, &[]).unwrap();
        data.truncate(6);
        assert!(matches!(split_binary(&data), Err(Error::ProtocolDecode(_))));
    }

    #[test]
    fn test_split_binary_invalid_utf8() {
        let data = vec![2, 0, 0, 0, 0xff, 0xfe];
        assert!(matches!(split_binary(&data), Err(Error::ProtocolDecode(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_shapes() {
        let cases = [
            Frame::Text("not json".into()),
            Frame::Text("[1, 2]".into()),
            text(json!({"jsonrpc": "2.0", "id": 1})),
            text(json!({"jsonrpc": "2.0", "method": "scene-changed", "params": {}})),
            text(json!({"jsonrpc": "2.0", "method": "progress"})),
            text(json!({"jsonrpc": "2.0", "method": "progress", "params": {"id": 1}})),
            text(json!({"jsonrpc": "2.0", "result": 1})),
        ];

        for frame in &cases {
            assert!(
                matches!(decode(frame), Err(Error::ProtocolDecode(_))),
                "frame should not decode: {:?}",
                frame
            );
        }
    }
}
