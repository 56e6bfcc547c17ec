//! OpenTelemetry instruments recorded by an [`Instance`](crate::Instance)
//!
//! Recorded only when the instance was built with observability enabled, see
//! [`Connector::with_observability`](crate::Connector::with_observability),
//! or given explicitly through [`InstanceOptions`](crate::InstanceOptions). Export goes
//! through whatever meter provider is installed globally, usually by
//! [`brayns_core::init_observability`].
//!
//! | Instrument | Kind | Attributes |
//! |---|---|---|
//! | `brayns.instance.connected` | gauge | |
//! | `brayns.instance.requests` | counter | `method`, `status` |
//! | `brayns.instance.request.duration` | histogram (s) | `method`, `status` |
//! | `brayns.instance.errors` | counter | `kind` |
//! | `brayns.instance.progress` | counter | |
//! | `brayns.instance.cancellations` | counter | |
//! | `brayns.instance.connection.attempts` | counter | |

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Instruments shared by one instance
pub struct InstanceMetrics {
    pub connected: Gauge<i64>,
    pub requests: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub errors: Counter<u64>,
    pub progress: Counter<u64>,
    pub cancellations: Counter<u64>,
    pub connection_attempts: Counter<u64>,
}

impl InstanceMetrics {
    /// Instruments on the global meter named `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let meter = global::meter_with_scope(
            opentelemetry::InstrumentationScope::builder(service_name.into()).build(),
        );
        Self::with_meter(&meter)
    }

    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            connected: meter
                .i64_gauge("brayns.instance.connected")
                .with_description("1 while the instance is connected, 0 otherwise")
                .build(),
            requests: meter
                .u64_counter("brayns.instance.requests")
                .with_description("Requests that reached a terminal outcome")
                .build(),
            request_duration: meter
                .f64_histogram("brayns.instance.request.duration")
                .with_description("Time from send to terminal outcome in seconds")
                .with_unit("s")
                .build(),
            errors: meter
                .u64_counter("brayns.instance.errors")
                .with_description("Errors by kind")
                .build(),
            progress: meter
                .u64_counter("brayns.instance.progress")
                .with_description("Progress notifications received")
                .build(),
            cancellations: meter
                .u64_counter("brayns.instance.cancellations")
                .with_description("Requests cancelled by the client")
                .build(),
            connection_attempts: meter
                .u64_counter("brayns.instance.connection.attempts")
                .with_description("WebSocket handshakes attempted")
                .build(),
        }
    }

    pub fn update_connection_state(&self, connected: bool) {
        self.connected.record(i64::from(connected), &[]);
    }

    /// Record a request outcome; `status` is `"ok"` or the error kind
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, kind: &str) {
        self.errors.add(1, &[KeyValue::new("kind", kind.to_string())]);
    }

    pub fn record_progress(&self) {
        self.progress.add(1, &[]);
    }

    pub fn record_cancellation(&self) {
        self.cancellations.add(1, &[]);
    }

    pub fn record_connection_attempt(&self) {
        self.connection_attempts.add(1, &[]);
    }
}

impl std::fmt::Debug for InstanceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceMetrics").finish_non_exhaustive()
    }
}

/// Short label for an error, used as the `status`/`kind` attribute
pub(crate) fn error_kind(error: &brayns_core::Error) -> &'static str {
    use brayns_core::Error;

    match error {
        Error::ProtocolDecode(_) => "protocol_decode",
        Error::DuplicateId(_) => "duplicate_id",
        Error::Remote(_) => "remote",
        Error::Timeout(_) => "timeout",
        Error::ConnectionClosed => "connection_closed",
        Error::Cancelled => "cancelled",
        Error::Connection(_) => "connection",
        Error::WebSocket(_) => "websocket",
        Error::Serialization(_) => "serialization",
        Error::Internal(_) => "internal",
    }
}
