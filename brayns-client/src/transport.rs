//! Duplex frame transport
//!
//! An [`Instance`](crate::Instance) talks to the engine through a
//! [`Transport`]: something that sends and receives opaque text or binary
//! frames. The receive loop of the instance is the only caller of
//! [`Transport::receive`]; any task may call [`Transport::send`].
//!
//! [`WebSocketTransport`] is the implementation used against a real engine.

use async_trait::async_trait;
use brayns_core::{Error, Frame, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Message-oriented duplex channel to an engine
///
/// Implementations must allow `send` and `receive` to run concurrently.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one frame
    ///
    /// Fails with `Error::ConnectionClosed` once the transport is closed.
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Wait for the next frame
    ///
    /// Fails with `Error::ConnectionClosed` when the peer closed the channel.
    async fn receive(&self) -> Result<Frame>;

    /// Close the channel; closing twice is a no-op
    async fn close(&self) -> Result<()>;

    /// Whether the channel is known to be closed
    fn is_closed(&self) -> bool;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport built on tokio-tungstenite
///
/// Text messages map to [`Frame::Text`] and binary messages to
/// [`Frame::Binary`]. Ping and pong are answered by tungstenite and never
/// surface as frames.
pub struct WebSocketTransport {
    sender: Mutex<SplitSink<WsStream, Message>>,
    receiver: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Perform the WebSocket handshake with `uri` (`ws://` or `wss://`)
    #[tracing::instrument]
    pub async fn connect(uri: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(uri)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        tracing::debug!("WebSocket handshake complete");
        let (sender, receiver) = ws_stream.split();

        Ok(Self {
            sender: Mutex::new(sender),
            receiver: Mutex::new(receiver),
            closed: AtomicBool::new(false),
        })
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        };

        self.sender
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    async fn receive(&self) -> Result<Frame> {
        let mut receiver = self.receiver.lock().await;

        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text)),
                Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data)),
                Some(Ok(Message::Close(close_frame))) => {
                    tracing::debug!(?close_frame, "Close frame received");
                    self.mark_closed();
                    return Err(Error::ConnectionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(Error::WebSocket(e.to_string()));
                }
                None => {
                    self.mark_closed();
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.sender
            .lock()
            .await
            .close()
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
