//! Connected Brayns instance
//!
//! An [`Instance`] owns one transport, one request registry and one receive
//! task. Any number of tasks may issue requests concurrently through a shared
//! reference (wrap it in an `Arc` to share across spawned tasks); each caller
//! only ever waits on its own [`RequestFuture`].
//!
//! # Lifecycle
//!
//! 1. **Connect**: [`Instance::connect`] or [`Instance::builder`]
//! 2. **Use**: [`request`](Instance::request), [`task`](Instance::task),
//!    [`notify`](Instance::notify), [`cancel`](Instance::cancel)
//! 3. **Disconnect**: [`disconnect`](Instance::disconnect), or simply drop the
//!    instance. Either way every pending request fails with
//!    `Error::ConnectionClosed`.
//!
//! # Example
//!
//! ```rust,no_run
//! use brayns_client::Instance;
//!
//! # async fn example() -> brayns_core::Result<()> {
//! let instance = Instance::connect("localhost:5000").await?;
//! let version = instance.get_version().await?;
//! println!("Connected to Brayns {}", version);
//! instance.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use crate::connector::{Connector, InstanceOptions};
use crate::future::{cancel_pending, send_cancel, RequestFuture};
use crate::metrics::{error_kind, InstanceMetrics};
use crate::registry::RequestRegistry;
use crate::transport::Transport;
use crate::Version;
use brayns_core::{
    codec, Error, Frame, Id, JsonRpcMessage, JsonRpcProgress, JsonRpcReply, JsonRpcRequest, Result,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const GET_VERSION_METHOD: &str = "get-version";
const QUIT_METHOD: &str = "quit";

/// Client side of a running Brayns engine
pub struct Instance {
    uri: String,
    transport: Arc<dyn Transport>,
    registry: RequestRegistry,
    options: InstanceOptions,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Instance {
    /// Connect to `uri` with default options
    ///
    /// A uri without scheme gets `ws://`. Use [`Instance::builder`] for
    /// `wss://`, timeouts, retries or observability.
    pub async fn connect(uri: impl Into<String>) -> Result<Self> {
        Connector::new(uri).connect().await
    }

    pub fn builder(uri: impl Into<String>) -> Connector {
        Connector::new(uri)
    }

    /// Wrap an already connected transport
    ///
    /// Starts the receive task, so it must be called from within a tokio
    /// runtime. [`uri`](Self::uri) is empty for such instances.
    pub fn with_transport(transport: Arc<dyn Transport>, options: InstanceOptions) -> Self {
        Self::from_parts(String::new(), transport, options)
    }

    pub(crate) fn from_parts(
        uri: String,
        transport: Arc<dyn Transport>,
        options: InstanceOptions,
    ) -> Self {
        let registry = RequestRegistry::new();

        let receive_task = tokio::spawn(receive_loop(
            transport.clone(),
            registry.clone(),
            options.metrics.clone(),
        ));

        if let Some(m) = &options.metrics {
            m.update_connection_state(true);
        }

        Self {
            uri,
            transport,
            registry,
            options,
            receive_task: Mutex::new(Some(receive_task)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && !self.transport.is_closed()
            && !self.registry.is_closed()
    }

    /// Number of requests still waiting for their outcome
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Send a prebuilt request and return its future
    ///
    /// A request without id gets the next integer id not already in flight,
    /// skipping numbers taken by explicit ids. Binary payloads
    /// attached with [`JsonRpcRequest::with_binary`] are sent as one binary
    /// frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` after a disconnection
    /// - `Error::DuplicateId` if the id is already in flight
    /// - transport errors if the frame could not be sent
    pub async fn submit(&self, mut request: JsonRpcRequest) -> Result<RequestFuture> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let future = match &request.id {
            Some(id) => self.registry.register(id.clone())?,
            None => {
                let future = self.registry.register_next()?;
                request.id = Some(future.id().clone());
                future
            }
        };
        let id = future.id().clone();
        let future = future
            .with_method(request.method.clone())
            .with_transport(self.transport.clone())
            .with_metrics(self.options.metrics.clone());

        let sent = match codec::encode_request(&request) {
            Ok(frame) => self.transport.send(frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.registry.remove(&id);
            tracing::error!(%id, method = %request.method, error = %e, "Failed to send request");
            return Err(e);
        }

        tracing::debug!(
            %id,
            method = %request.method,
            binary = request.binary.len(),
            "Request sent"
        );
        Ok(future)
    }

    /// Send a request and return its future without waiting for the reply
    #[tracing::instrument(skip(self, method, params), fields(method = %method.as_ref()))]
    pub async fn task<P>(
        &self,
        method: impl Into<String> + AsRef<str>,
        params: P,
    ) -> Result<RequestFuture>
    where
        P: Serialize,
    {
        // No id yet: submit allocates one.
        let request = JsonRpcRequest::notification(method, to_params(params)?);
        self.submit(request).await
    }

    /// Send a request and wait for its deserialized result
    ///
    /// Uses the default request timeout of the instance, if any.
    pub async fn request<P, R>(
        &self,
        method: impl Into<String> + AsRef<str>,
        params: P,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request_with_timeout(method, params, self.options.request_timeout)
            .await
    }

    /// Send a request and wait at most `timeout` for its result
    ///
    /// On timeout the request is cancelled, the engine is notified and
    /// `Error::Timeout` is returned. A reply that won the race is returned
    /// instead.
    pub async fn request_with_timeout<P, R>(
        &self,
        method: impl Into<String> + AsRef<str>,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let reply = self
            .execute(method, params, timeout, &mut |_: &JsonRpcProgress| {})
            .await?;
        decode_result(reply)
    }

    /// Send a request, report its progress and wait for its result
    pub async fn request_with_progress<P, R, F>(
        &self,
        method: impl Into<String> + AsRef<str>,
        params: P,
        mut on_progress: F,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
        F: FnMut(&JsonRpcProgress),
    {
        let reply = self
            .execute(method, params, self.options.request_timeout, &mut on_progress)
            .await?;
        decode_result(reply)
    }

    async fn execute<P, F>(
        &self,
        method: impl Into<String> + AsRef<str>,
        params: P,
        timeout: Option<Duration>,
        on_progress: &mut F,
    ) -> Result<JsonRpcReply>
    where
        P: Serialize,
        F: FnMut(&JsonRpcProgress),
    {
        let start = Instant::now();
        let method = method.into();
        let future = self.task(method.as_str(), params).await?;
        let outcome = self.settle(future, timeout, on_progress).await;

        let duration = start.elapsed().as_secs_f64();
        match &outcome {
            Ok(_) => {
                tracing::debug!(%method, duration_secs = duration, "Request completed");
                if let Some(m) = &self.options.metrics {
                    m.record_request(&method, "ok", duration);
                }
            }
            Err(e) => {
                tracing::debug!(%method, duration_secs = duration, error = %e, "Request failed");
                if let Some(m) = &self.options.metrics {
                    m.record_request(&method, error_kind(e), duration);
                    m.record_error(error_kind(e));
                }
            }
        }
        outcome
    }

    async fn settle<F>(
        &self,
        mut future: RequestFuture,
        timeout: Option<Duration>,
        on_progress: &mut F,
    ) -> Result<JsonRpcReply>
    where
        F: FnMut(&JsonRpcProgress),
    {
        match timeout {
            None => future.settle(on_progress).await,
            Some(limit) => {
                let timed_out = tokio::time::timeout(limit, future.settle(on_progress))
                    .await
                    .is_err();
                // A reply racing the deadline makes cancel return false.
                if timed_out && future.cancel().await {
                    tracing::warn!(id = %future.id(), timeout = ?limit, "Request timed out");
                    return Err(Error::Timeout(limit));
                }
            }
        }

        future
            .into_outcome()
            .unwrap_or_else(|| Err(Error::Internal("Request settled without outcome".to_string())))
    }

    /// Send a notification; the engine never replies to it
    pub async fn notify<P>(&self, method: impl Into<String>, params: P) -> Result<()>
    where
        P: Serialize,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let notification = JsonRpcRequest::notification(method, to_params(params)?);
        let frame = codec::encode_request(&notification)?;
        self.transport.send(frame).await?;

        tracing::debug!(method = %notification.method, "Notification sent");
        Ok(())
    }

    /// Cancel the request `id` without holding its future
    ///
    /// Returns whether the request was pending. Cancelling a request that
    /// already resolved does nothing.
    pub async fn cancel(&self, id: &Id) -> bool {
        if !cancel_pending(&self.registry, id, self.options.metrics.as_deref()) {
            tracing::debug!(%id, "Cancel ignored, request not pending");
            return false;
        }

        send_cancel(self.transport.as_ref(), id).await;
        true
    }

    /// Query the engine version
    pub async fn get_version(&self) -> Result<Version> {
        self.request(GET_VERSION_METHOD, ()).await
    }

    /// Ask the engine to quit, then disconnect
    ///
    /// The engine may close the connection before replying; that counts as
    /// success.
    pub async fn stop(&self) -> Result<()> {
        let quit = match self.request::<_, serde_json::Value>(QUIT_METHOD, ()).await {
            Ok(_) | Err(Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        };
        self.disconnect().await?;
        quit
    }

    /// Close the connection and fail every pending request
    ///
    /// Idempotent: later calls return `Ok(())` without doing anything.
    #[tracing::instrument(skip(self), fields(uri = %self.uri))]
    pub async fn disconnect(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drained = self.shutdown();
        tracing::info!(drained, "Disconnecting from instance");
        self.transport.close().await
    }

    /// Stop the receive task and drain the registry
    fn shutdown(&self) -> usize {
        let task = self
            .receive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        if let Some(m) = &self.options.metrics {
            m.update_connection_state(false);
        }
        self.registry.drain_on_disconnect()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained = self.shutdown();
        tracing::debug!(uri = %self.uri, drained, "Instance dropped");

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let transport = self.transport.clone();
            runtime.spawn(async move {
                if let Err(e) = transport.close().await {
                    tracing::debug!(error = %e, "Transport close after drop failed");
                }
            });
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("uri", &self.uri)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Read frames until the transport fails, dispatching each to its request
async fn receive_loop(
    transport: Arc<dyn Transport>,
    registry: RequestRegistry,
    metrics: Option<Arc<InstanceMetrics>>,
) {
    loop {
        match transport.receive().await {
            Ok(frame) => handle_frame(&frame, &registry, metrics.as_deref()),
            Err(Error::ConnectionClosed) => {
                tracing::info!("Connection closed by instance");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Transport failure");
                if let Some(m) = &metrics {
                    m.record_error(error_kind(&e));
                }
                break;
            }
        }
    }

    let drained = registry.drain_on_disconnect();
    if drained > 0 {
        tracing::warn!(drained, "Pending requests failed by disconnection");
    }
    if let Some(m) = &metrics {
        m.update_connection_state(false);
    }
}

fn handle_frame(frame: &Frame, registry: &RequestRegistry, metrics: Option<&InstanceMetrics>) {
    let message = match codec::decode(frame) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, size = frame.len(), "Dropping undecodable frame");
            if let Some(m) = metrics {
                m.record_error(error_kind(&e));
            }
            return;
        }
    };

    if let (JsonRpcMessage::Progress(_), Some(m)) = (&message, metrics) {
        m.record_progress();
    }
    registry.dispatch(message);
}

/// Serialize params, mapping unit and `null` to no params at all
fn to_params<P: Serialize>(params: P) -> Result<Option<serde_json::Value>> {
    match serde_json::to_value(params)? {
        serde_json::Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

fn decode_result<R: DeserializeOwned>(reply: JsonRpcReply) -> Result<R> {
    serde_json::from_value(reply.result).map_err(|e| Error::Serialization(e.to_string()))
}
