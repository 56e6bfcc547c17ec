//! Brayns instance over WebSocket
//!
//! This crate connects to a running Brayns engine and correlates JSON-RPC
//! requests with their replies, errors and progress notifications.
//!
//! # Core Features
//!
//! - **Transport**: pluggable [`Transport`], tokio-tungstenite by default
//! - **Registry**: [`RequestRegistry`] routes every incoming message to the
//!   one request that owns its id, exactly once
//! - **Futures**: [`RequestFuture`] streams progress in order, then yields the
//!   outcome
//! - **Instance**: [`Instance`] ties it together with timeouts, cancellation
//!   and scoped disconnection
//! - **Observability**: `tracing` everywhere, OpenTelemetry metrics on demand
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use brayns_client::Instance;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let instance = Instance::connect("localhost:5000").await?;
//!
//!     let version = instance.get_version().await?;
//!     println!("Brayns {}", version);
//!
//!     let mut snapshot = instance
//!         .task("snapshot", json!({"path": "/tmp/frame.png"}))
//!         .await?;
//!     while let Some(progress) = snapshot.next_progress().await {
//!         println!("{} {:.0}%", progress.operation, progress.amount * 100.0);
//!     }
//!     snapshot.wait().await?;
//!
//!     instance.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # With Options
//!
//! ```rust,no_run
//! use brayns_client::{ExponentialBackoff, Instance};
//! use std::time::Duration;
//!
//! # async fn example() -> brayns_core::Result<()> {
//! let instance = Instance::builder("render-node:5000")
//!     .secure(true)
//!     .with_request_timeout(Duration::from_secs(60))
//!     .with_retry(Box::new(
//!         ExponentialBackoff::new(Duration::from_millis(200), Duration::from_secs(5))
//!             .with_max_attempts(8)
//!             .with_jitter(),
//!     ))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod connector;
mod future;
mod instance;
mod metrics;
mod registry;
mod retry;
mod transport;
mod version;

pub use connector::{Connector, InstanceOptions};
pub use future::RequestFuture;
pub use instance::Instance;
pub use metrics::InstanceMetrics;
pub use registry::{RequestEvent, RequestRegistry};
pub use retry::{ExponentialBackoff, FixedDelay, NoRetry, RetryStrategy};
pub use transport::{Transport, WebSocketTransport};
pub use version::Version;
