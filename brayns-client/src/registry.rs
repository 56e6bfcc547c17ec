//! In-flight request tracking
//!
//! The registry correlates outgoing requests with the messages the engine
//! sends back for them.
//!
//! # Request lifecycle
//!
//! 1. **Register**: an id gets a pending entry and a [`RequestFuture`]
//! 2. **Send**: the request frame goes out on the transport
//! 3. **Progress**: zero or more progress events are appended to the entry
//! 4. **Resolve**: exactly one of reply, error, local cancellation or
//!    disconnection resolves the entry, which is then removed
//!
//! Each entry owns an unbounded channel feeding its future. Progress events and
//! the terminal outcome travel on the same channel, so a caller always sees
//! progress in wire order and the outcome last.
//!
//! # Locking
//!
//! The id table is the only state shared between the receive loop and the
//! callers. Every operation takes one `std::sync::Mutex` for a few map
//! operations and never holds it across an await point, so all methods are
//! synchronous and usable from `Drop`.

use crate::future::RequestFuture;
use brayns_core::{Error, Id, JsonRpcError, JsonRpcMessage, JsonRpcProgress, JsonRpcReply, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Cancelled ids remembered for discarding late replies, oldest forgotten first
const CANCELLED_CAPACITY: usize = 1024;

/// Event delivered to the future of one request
#[derive(Debug)]
pub enum RequestEvent {
    /// Non-terminal progress report
    Progress(JsonRpcProgress),
    /// Terminal outcome; always the last event of a request
    Done(Result<JsonRpcReply>),
}

#[derive(Default)]
struct RegistryState {
    pending: HashMap<Id, mpsc::UnboundedSender<RequestEvent>>,
    /// Ids cancelled locally whose late messages must be dropped quietly
    cancelled: HashSet<Id>,
    cancel_order: VecDeque<Id>,
    closed: bool,
}

impl RegistryState {
    fn remember_cancelled(&mut self, id: Id) {
        if self.cancelled.insert(id.clone()) {
            self.cancel_order.push_back(id);
        }
        while self.cancel_order.len() > CANCELLED_CAPACITY {
            if let Some(oldest) = self.cancel_order.pop_front() {
                self.cancelled.remove(&oldest);
            }
        }
    }
}

/// Table of in-flight requests keyed by correlation id
///
/// Cheap to clone; all clones share the same table.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    state: Arc<Mutex<RegistryState>>,
    counter: Arc<AtomicI64>,
}

impl RequestRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next numeric id (0, 1, 2, ...)
    pub fn next_id(&self) -> Id {
        Id::Number(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a pending request and return its future
    ///
    /// # Errors
    ///
    /// - `Error::DuplicateId` if `id` is already in flight
    /// - `Error::ConnectionClosed` if the registry has been drained
    pub fn register(&self, id: Id) -> Result<RequestFuture> {
        let mut state = self.lock();

        if state.closed {
            return Err(Error::ConnectionClosed);
        }
        if state.pending.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        Ok(self.insert(&mut state, id))
    }

    /// Register a request under the next numeric id not already in flight
    ///
    /// Numbers taken by explicitly registered ids are skipped.
    pub fn register_next(&self) -> Result<RequestFuture> {
        let mut state = self.lock();

        if state.closed {
            return Err(Error::ConnectionClosed);
        }
        let mut id = self.next_id();
        while state.pending.contains_key(&id) {
            id = self.next_id();
        }
        Ok(self.insert(&mut state, id))
    }

    fn insert(&self, state: &mut RegistryState, id: Id) -> RequestFuture {
        // A reused id starts afresh.
        state.cancelled.remove(&id);

        let (tx, rx) = mpsc::unbounded_channel();
        state.pending.insert(id.clone(), tx);

        RequestFuture::new(id, rx, self.clone())
    }

    /// Route a decoded message to its request
    ///
    /// Returns whether a pending request consumed the message.
    pub fn dispatch(&self, message: JsonRpcMessage) -> bool {
        match message {
            JsonRpcMessage::Reply(reply) => self.dispatch_reply(reply),
            JsonRpcMessage::Error(error) => self.dispatch_error(error),
            JsonRpcMessage::Progress(progress) => self.dispatch_progress(progress),
        }
    }

    /// Resolve a request with its reply and remove it
    pub fn dispatch_reply(&self, reply: JsonRpcReply) -> bool {
        let id = reply.id.clone();
        self.resolve(&id, Ok(reply))
    }

    /// Resolve a request with a remote error and remove it
    ///
    /// Errors without an id cannot be attributed and are dropped.
    pub fn dispatch_error(&self, error: JsonRpcError) -> bool {
        match error.id {
            Some(id) => self.resolve(&id, Err(Error::Remote(error.error))),
            None => {
                tracing::warn!(error = %error.error, "Dropping error reply without request id");
                false
            }
        }
    }

    /// Append a progress event to a pending request
    pub fn dispatch_progress(&self, progress: JsonRpcProgress) -> bool {
        let state = self.lock();

        match state.pending.get(&progress.id) {
            Some(tx) => {
                let _ = tx.send(RequestEvent::Progress(progress));
                true
            }
            None if state.cancelled.contains(&progress.id) => {
                tracing::debug!(id = %progress.id, "Discarding progress of cancelled request");
                false
            }
            None => {
                tracing::warn!(id = %progress.id, "Dropping progress for unknown request id");
                false
            }
        }
    }

    fn resolve(&self, id: &Id, outcome: Result<JsonRpcReply>) -> bool {
        let mut state = self.lock();

        if let Some(tx) = state.pending.remove(id) {
            // The caller may have dropped its future; nothing left to do then.
            let _ = tx.send(RequestEvent::Done(outcome));
            return true;
        }

        if state.cancelled.remove(id) {
            tracing::debug!(%id, "Discarding late reply of cancelled request");
        } else {
            tracing::warn!(%id, "Dropping reply for unknown request id");
        }
        false
    }

    /// Resolve a pending request as cancelled
    ///
    /// Later messages for this id are discarded silently. Returns `false`
    /// and changes nothing if the request is not pending (already resolved or
    /// never registered).
    pub fn cancel(&self, id: &Id) -> bool {
        let mut state = self.lock();

        match state.pending.remove(id) {
            Some(tx) => {
                state.remember_cancelled(id.clone());
                let _ = tx.send(RequestEvent::Done(Err(Error::Cancelled)));
                true
            }
            None => false,
        }
    }

    /// Remove a pending request without resolving it
    ///
    /// Used when the request could not be sent and the error is returned to
    /// the caller directly.
    pub(crate) fn remove(&self, id: &Id) -> bool {
        self.lock().pending.remove(id).is_some()
    }

    /// Resolve every pending request with `Error::ConnectionClosed`
    ///
    /// The registry is closed in the same critical section, so no request can
    /// be registered afterwards. Returns the number of requests resolved;
    /// calling it again resolves nothing and returns 0.
    pub fn drain_on_disconnect(&self) -> usize {
        let mut state = self.lock();

        state.closed = true;
        state.cancelled.clear();
        state.cancel_order.clear();

        let count = state.pending.len();
        for (_, tx) in state.pending.drain() {
            let _ = tx.send(RequestEvent::Done(Err(Error::ConnectionClosed)));
        }
        count
    }

    /// Number of requests awaiting an outcome
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether `id` is awaiting an outcome
    pub fn is_pending(&self, id: &Id) -> bool {
        self.lock().pending.contains_key(id)
    }

    /// Whether the registry has been drained
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
