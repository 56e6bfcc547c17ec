//! Instance configuration and connection
//!
//! [`Connector`] collects the options of an [`Instance`] before the WebSocket
//! handshake:
//! - scheme selection when the uri has none (`secure`)
//! - default timeout applied by [`Instance::request`]
//! - retry strategy for the handshake itself
//! - OpenTelemetry observability and metrics
//!
//! ```rust,no_run
//! use brayns_client::{ExponentialBackoff, Instance};
//! use std::time::Duration;
//!
//! # async fn example() -> brayns_core::Result<()> {
//! let instance = Instance::builder("localhost:5000")
//!     .with_request_timeout(Duration::from_secs(30))
//!     .with_retry(Box::new(ExponentialBackoff::default()))
//!     .connect()
//!     .await?;
//!
//! let secure = Instance::builder("render.example.org:443")
//!     .secure(true)
//!     .with_default_observability()
//!     .service_name("render-farm")
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::metrics::InstanceMetrics;
use crate::retry::{ExponentialBackoff, NoRetry, RetryStrategy};
use crate::transport::WebSocketTransport;
use crate::Instance;
use brayns_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// Runtime options of a connected instance
#[derive(Debug, Clone, Default)]
pub struct InstanceOptions {
    /// Timeout applied by [`Instance::request`]; `None` waits forever
    pub request_timeout: Option<Duration>,
    pub metrics: Option<Arc<InstanceMetrics>>,
}

impl InstanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<InstanceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Builder for an [`Instance`] connected over WebSocket
pub struct Connector {
    uri: String,
    secure: bool,
    request_timeout: Option<Duration>,
    retry: Option<Box<dyn RetryStrategy>>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl Connector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            secure: false,
            request_timeout: None,
            retry: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Use `wss://` instead of `ws://` when the uri has no scheme
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Default timeout of [`Instance::request`]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Retry a failed handshake with `strategy`
    pub fn with_retry(mut self, strategy: Box<dyn RetryStrategy>) -> Self {
        self.retry = Some(strategy);
        self
    }

    /// Retry a failed handshake with [`ExponentialBackoff::default`]
    pub fn with_default_retry(self) -> Self {
        self.with_retry(Box::new(ExponentialBackoff::default()))
    }

    /// Install logging, traces and metrics on connect, then record instance metrics
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(self) -> Self {
        self.with_observability(ObservabilityConfig::default())
    }

    /// Service name reported by observability, overrides the config
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Uri the handshake targets, scheme included
    pub fn uri(&self) -> String {
        if self.uri.contains("://") {
            return self.uri.clone();
        }
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}", scheme, self.uri)
    }

    fn init_metrics(&mut self) -> Result<Option<Arc<InstanceMetrics>>> {
        let Some(mut config) = self.observability_config.take() else {
            return Ok(None);
        };
        if let Some(name) = self.service_name.take() {
            config.service_name = name;
        }

        let service_name = config.service_name.clone();
        brayns_core::init_observability(config)
            .map_err(|e| Error::Internal(format!("Failed to initialize observability: {}", e)))?;

        Ok(Some(Arc::new(InstanceMetrics::new(service_name))))
    }

    /// Perform the handshake, retrying per the strategy, and start the instance
    ///
    /// # Errors
    ///
    /// `Error::Connection` with the last handshake failure once the strategy
    /// gives up.
    #[tracing::instrument(skip(self), fields(uri = %self.uri()))]
    pub async fn connect(mut self) -> Result<Instance> {
        let metrics = self.init_metrics()?;
        let uri = self.uri();
        let mut strategy = self.retry.take().unwrap_or_else(|| Box::new(NoRetry));

        let mut attempt = 0;
        let transport = loop {
            if let Some(m) = &metrics {
                m.record_connection_attempt();
            }

            match WebSocketTransport::connect(&uri).await {
                Ok(transport) => {
                    strategy.reset();
                    break transport;
                }
                Err(e) => match strategy.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(attempt, ?delay, error = %e, "Connection failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::error!(attempts = attempt + 1, error = %e, "Connection failed");
                        if let Some(m) = &metrics {
                            m.record_error("connection");
                        }
                        return Err(e);
                    }
                },
            }
        };

        tracing::info!("Connected to instance");

        let options = InstanceOptions {
            request_timeout: self.request_timeout,
            metrics,
        };
        Ok(Instance::from_parts(uri, Arc::new(transport), options))
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("uri", &self.uri)
            .field("secure", &self.secure)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry.is_some())
            .field("observability", &self.observability_config.is_some())
            .finish()
    }
}
