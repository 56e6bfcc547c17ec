//! Retry policies for the connection handshake
//!
//! A [`Connector`](crate::Connector) retries a failed WebSocket handshake
//! according to a [`RetryStrategy`]. Once connected, an instance never
//! reconnects on its own: a lost connection fails every pending request.
//!
//! - [`ExponentialBackoff`]: doubling delays, capped, optional jitter
//! - [`FixedDelay`]: constant delay
//! - [`NoRetry`]: a single attempt (the default)
//!
//! ```rust
//! use brayns_client::{ExponentialBackoff, RetryStrategy};
//! use std::time::Duration;
//!
//! let mut strategy = ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(4))
//!     .with_max_attempts(5);
//! assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(250)));
//! assert_eq!(strategy.next_delay(5), None);
//! ```

use std::time::Duration;

/// Decides how long to wait before retrying a failed handshake
pub trait RetryStrategy: Send + Sync {
    /// Delay before retry number `attempt` (0-indexed), `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Forget accumulated state after a successful connection
    fn reset(&mut self) {}
}

/// Exponentially growing delays between `min_delay` and `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Give up after `max_attempts` retries
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% of random delay to each retry
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_max_attempts(5)
            .with_jitter()
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay = 2u64
            .checked_pow(attempt)
            .and_then(|factor| min_ms.checked_mul(factor))
            .map_or(max_ms, |ms| ms.min(max_ms));

        if self.jitter {
            use rand::Rng;
            let extra = rand::thread_rng().gen_range(0..=delay / 4);
            return Some(Duration::from_millis(delay + extra));
        }

        Some(Duration::from_millis(delay))
    }
}

/// Constant delay between retries
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Fail on the first handshake error
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }
}
