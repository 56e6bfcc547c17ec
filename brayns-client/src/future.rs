//! Handle on one in-flight request
//!
//! A [`RequestFuture`] is returned by [`Instance::task`](crate::Instance::task)
//! (or [`RequestRegistry::register`](crate::RequestRegistry::register)). It
//! receives the progress events of its request in wire order, then exactly
//! one terminal outcome.
//!
//! ```rust,no_run
//! # async fn example(instance: &brayns_client::Instance) -> brayns_core::Result<()> {
//! let mut task = instance.task("snapshot", serde_json::json!({"path": "frame.png"})).await?;
//!
//! while let Some(progress) = task.next_progress().await {
//!     println!("{}: {:.0}%", progress.operation, progress.amount * 100.0);
//! }
//!
//! let reply = task.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Dropping a future before its outcome arrives cancels the request, so a
//! caller abandoned by `select!` or an outer timeout leaves nothing pending.

use crate::metrics::InstanceMetrics;
use crate::registry::{RequestEvent, RequestRegistry};
use crate::transport::Transport;
use brayns_core::{
    codec, Error, Id, JsonRpcProgress, JsonRpcReply, JsonRpcRequest, Result, CANCEL_METHOD,
};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Pending outcome of one request
pub struct RequestFuture {
    id: Id,
    method: Option<String>,
    events: mpsc::UnboundedReceiver<RequestEvent>,
    buffered: VecDeque<JsonRpcProgress>,
    outcome: Option<Result<JsonRpcReply>>,
    resolved: bool,
    registry: RequestRegistry,
    transport: Option<Arc<dyn Transport>>,
    metrics: Option<Arc<InstanceMetrics>>,
}

impl RequestFuture {
    pub(crate) fn new(
        id: Id,
        events: mpsc::UnboundedReceiver<RequestEvent>,
        registry: RequestRegistry,
    ) -> Self {
        Self {
            id,
            method: None,
            events,
            buffered: VecDeque::new(),
            outcome: None,
            resolved: false,
            registry,
            transport: None,
            metrics: None,
        }
    }

    pub(crate) fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Transport used to forward cancellations to the engine
    pub(crate) fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub(crate) fn with_metrics(mut self, metrics: Option<Arc<InstanceMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Correlation id of the request
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Method name, when the request was sent by an instance
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    fn accept(&mut self, event: Option<RequestEvent>) {
        match event {
            Some(RequestEvent::Progress(progress)) => self.buffered.push_back(progress),
            Some(RequestEvent::Done(outcome)) => {
                self.outcome = Some(outcome);
                self.resolved = true;
            }
            None => {
                self.outcome = Some(Err(Error::Internal("Request channel closed".to_string())));
                self.resolved = true;
            }
        }
    }

    /// Move every event already delivered into the local buffer
    fn poll_events(&mut self) {
        while !self.resolved {
            match self.events.try_recv() {
                Ok(event) => self.accept(Some(event)),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => self.accept(None),
            }
        }
    }

    /// Whether the terminal outcome has arrived
    ///
    /// Never waits. Progress events that arrived meanwhile stay buffered for
    /// [`next_progress`](Self::next_progress).
    pub fn is_ready(&mut self) -> bool {
        self.poll_events();
        self.resolved
    }

    /// Next progress event, in the order the engine sent them
    ///
    /// Returns `None` once every progress event has been consumed and the
    /// terminal outcome has arrived.
    pub async fn next_progress(&mut self) -> Option<JsonRpcProgress> {
        loop {
            if let Some(progress) = self.buffered.pop_front() {
                return Some(progress);
            }
            if self.resolved {
                return None;
            }
            let event = self.events.recv().await;
            self.accept(event);
        }
    }

    /// Wait for the outcome, handing each progress event to `on_progress`
    ///
    /// Cancel safe: if the returned future is dropped, no event is lost.
    pub(crate) async fn settle<F>(&mut self, on_progress: &mut F)
    where
        F: FnMut(&JsonRpcProgress),
    {
        while let Some(progress) = self.next_progress().await {
            on_progress(&progress);
        }
    }

    fn take_outcome(&mut self) -> Result<JsonRpcReply> {
        self.outcome
            .take()
            .unwrap_or_else(|| Err(Error::Internal("Request outcome already consumed".to_string())))
    }

    /// Wait for the terminal outcome, discarding remaining progress
    ///
    /// # Errors
    ///
    /// - `Error::Remote` if the engine answered with an error
    /// - `Error::Cancelled` if the request was cancelled locally
    /// - `Error::ConnectionClosed` if the connection closed first
    pub async fn wait(mut self) -> Result<JsonRpcReply> {
        self.settle(&mut |_: &JsonRpcProgress| {}).await;
        self.take_outcome()
    }

    /// Wait for the terminal outcome, reporting each progress event first
    pub async fn wait_with_progress<F>(mut self, mut on_progress: F) -> Result<JsonRpcReply>
    where
        F: FnMut(&JsonRpcProgress),
    {
        self.settle(&mut on_progress).await;
        self.take_outcome()
    }

    /// Wait for the reply and deserialize its result
    pub async fn wait_for_result<R: DeserializeOwned>(self) -> Result<R> {
        let reply = self.wait().await?;
        serde_json::from_value(reply.result).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Cancel the request
    ///
    /// The future resolves with `Error::Cancelled` right away and, when the
    /// request was still pending, the engine is asked to stop it. The engine
    /// may still finish; its late reply is discarded. Cancelling a request
    /// that already resolved does nothing. Returns whether the request was
    /// pending.
    pub async fn cancel(&mut self) -> bool {
        let cancelled = cancel_pending(&self.registry, &self.id, self.metrics.as_deref());
        if cancelled {
            if let Some(transport) = &self.transport {
                send_cancel(transport.as_ref(), &self.id).await;
            }
        }
        cancelled
    }

    /// Outcome left behind after [`settle`](Self::settle), if any
    pub(crate) fn into_outcome(mut self) -> Option<Result<JsonRpcReply>> {
        self.poll_events();
        self.outcome.take()
    }
}

impl Drop for RequestFuture {
    fn drop(&mut self) {
        self.poll_events();
        if self.resolved || !cancel_pending(&self.registry, &self.id, self.metrics.as_deref()) {
            return;
        }
        tracing::debug!(
            id = %self.id,
            method = ?self.method,
            "Request abandoned before its outcome"
        );

        let runtime = tokio::runtime::Handle::try_current();
        if let (Some(transport), Ok(runtime)) = (self.transport.clone(), runtime) {
            let id = self.id.clone();
            runtime.spawn(async move {
                send_cancel(transport.as_ref(), &id).await;
            });
        }
    }
}

impl std::fmt::Debug for RequestFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFuture")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("buffered", &self.buffered.len())
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// Resolve `id` as cancelled and count it; `false` if it was not pending
pub(crate) fn cancel_pending(
    registry: &RequestRegistry,
    id: &Id,
    metrics: Option<&InstanceMetrics>,
) -> bool {
    if !registry.cancel(id) {
        return false;
    }
    tracing::debug!(%id, "Request cancelled");
    if let Some(m) = metrics {
        m.record_cancellation();
    }
    true
}

/// Ask the engine to stop the request `id`; failures are only logged
pub(crate) async fn send_cancel(transport: &dyn Transport, id: &Id) {
    let params = serde_json::json!({ "id": id });
    let notification = JsonRpcRequest::notification(CANCEL_METHOD, Some(params));

    let result = match codec::encode_request(&notification) {
        Ok(frame) => transport.send(frame).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!(%id, error = %e, "Failed to send cancel notification");
    }
}
