/// Bounded exponential backoff and external cancellation
use crate::config::RetryConfig;
use crate::error::{DidError, DidResult};
use std::time::Duration;
use tokio::sync::watch;

/// Exponential backoff with a delay cap and an attempt ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base: config.base_delay,
            cap: config.max_delay,
            max_attempts: config.max_attempts.max(1),
            attempts: 0,
        }
    }

    /// Record an attempt and return its 1-based number
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            None
        } else {
            Some(self.delay_after(self.attempts))
        }
    }

    /// Delay that follows the given 1-based attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }
}

/// Sending half of a cancellation signal
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Signal every subscribed operation to stop
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to publish and resolve
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Completes once cancellation is requested; pends forever otherwise
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Canceller dropped without firing
                return std::future::pending().await;
            }
        }
    }
}

/// Sleep for `delay` unless cancelled first
pub async fn sleep_or_cancel(
    delay: Duration,
    cancel: &CancelSignal,
    message_id: Option<String>,
) -> DidResult<()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(DidError::Cancelled { message_id }),
    }
}
