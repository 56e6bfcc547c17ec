//! Common test utilities for brayns-client integration tests
//!
//! [`MockEngine`] is a small WebSocket server that plays the engine side: it
//! records every request it receives and answers with whatever frames the
//! test handler returns. [`ChannelTransport`] is an in-memory transport for
//! tests that drive the frames by hand.

#![allow(dead_code)]

use async_trait::async_trait;
use brayns_core::{codec, Error, Frame, Result};
use brayns_client::Transport;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// A request as seen by the engine
#[derive(Debug, Clone)]
pub struct Received {
    pub json: Value,
    pub binary: Vec<u8>,
}

impl Received {
    fn parse(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self {
                json: serde_json::from_str(&text).ok()?,
                binary: Vec::new(),
            }),
            Message::Binary(data) => {
                let (json, binary) = codec::split_binary(&data).ok()?;
                Some(Self {
                    json: serde_json::from_str(json).ok()?,
                    binary: binary.to_vec(),
                })
            }
            _ => None,
        }
    }

    pub fn method(&self) -> &str {
        self.json["method"].as_str().unwrap_or_default()
    }

    pub fn id(&self) -> &Value {
        &self.json["id"]
    }
}

/// Mock Brayns engine
pub struct MockEngine {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    received_rx: mpsc::UnboundedReceiver<Received>,
}

impl MockEngine {
    /// Engine that never answers
    pub async fn silent() -> Self {
        Self::with_handler(|_| async { Vec::new() }).await
    }

    /// Engine answering each request with the frames returned by `handler`
    ///
    /// A `Message::Close` in the returned frames closes the connection after
    /// the preceding frames were sent.
    pub async fn with_handler<F, Fut>(handler: F) -> Self
    where
        F: Fn(Received) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Message>> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let handler = handler.clone();
                        let received_tx = received_tx.clone();

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();

                            while let Some(Ok(message)) = read.next().await {
                                if message.is_close() {
                                    break;
                                }
                                let Some(received) = Received::parse(message) else { continue };
                                let _ = received_tx.send(received.clone());

                                for answer in handler(received).await {
                                    if answer.is_close() {
                                        let _ = write.send(answer).await;
                                        return;
                                    }
                                    let _ = write.send(answer).await;
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            received_rx,
        }
    }

    /// Address without scheme, as a user would type it
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next request received by the engine, `None` after 5 seconds
    pub async fn next_request(&mut self) -> Option<Received> {
        tokio::time::timeout(Duration::from_secs(5), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Reply frame with `result`
pub fn reply(id: impl Into<Value>, result: Value) -> Message {
    Message::Text(json!({"jsonrpc": "2.0", "id": id.into(), "result": result}).to_string())
}

/// Reply frame with `result` and a binary tail
pub fn binary_reply(id: impl Into<Value>, result: Value, binary: &[u8]) -> Message {
    let text = json!({"jsonrpc": "2.0", "id": id.into(), "result": result}).to_string();
    Message::Binary(codec::encode_binary(&text, binary).unwrap())
}

/// Error frame
pub fn error(id: impl Into<Value>, code: i64, message: &str) -> Message {
    Message::Text(
        json!({
            "jsonrpc": "2.0",
            "id": id.into(),
            "error": {"code": code, "message": message}
        })
        .to_string(),
    )
}

/// Progress notification frame
pub fn progress(id: impl Into<Value>, operation: &str, amount: f64) -> Message {
    Message::Text(
        json!({
            "jsonrpc": "2.0",
            "method": "progress",
            "params": {"id": id.into(), "operation": operation, "amount": amount}
        })
        .to_string(),
    )
}

/// In-memory transport
///
/// Frames sent by the instance arrive on the receiver returned by
/// [`ChannelTransport::new`]; frames pushed on the returned sender are
/// received by the instance. Dropping that sender closes the transport.
pub struct ChannelTransport {
    outgoing: mpsc::UnboundedSender<Frame>,
    incoming: Mutex<mpsc::UnboundedReceiver<Frame>>,
    closed: AtomicBool,
}

impl ChannelTransport {
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<Frame>,
        mpsc::UnboundedSender<Frame>,
    ) {
        let (outgoing, sent) = mpsc::unbounded_channel();
        let (push, incoming) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            outgoing,
            incoming: Mutex::new(incoming),
            closed: AtomicBool::new(false),
        });
        (transport, sent, push)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.outgoing.send(frame).map_err(|_| Error::ConnectionClosed)
    }

    async fn receive(&self) -> Result<Frame> {
        let frame = self.incoming.lock().await.recv().await;
        frame.ok_or_else(|| {
            self.closed.store(true, Ordering::SeqCst);
            Error::ConnectionClosed
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Parse a text frame sent by the instance
pub fn parse_frame(frame: &Frame) -> Value {
    match frame {
        Frame::Text(text) => serde_json::from_str(text).unwrap(),
        Frame::Binary(data) => {
            let (json, _) = codec::split_binary(data).unwrap();
            serde_json::from_str(json).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_helpers() {
        let Message::Text(text) = progress(2, "Rendering", 0.5) else {
            panic!("progress must be text");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["method"], "progress");
        assert!(value.get("id").is_none());

        let Message::Binary(data) = binary_reply(1, json!({}), b"abc") else {
            panic!("binary reply must be binary");
        };
        let (_, tail) = codec::split_binary(&data).unwrap();
        assert_eq!(tail, b"abc");
    }
}
