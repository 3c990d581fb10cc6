//! Retry/cancel/pause kernel (C6)
//!
//! Cooperative suspension, cancellation signaling, and exponential-backoff
//! retry for recoverable I/O errors. Tokens are plain `Arc<AtomicBool>`
//! flags rather than closures so they're trivially `Clone + Send + Sync`
//! across the bounded worker pool in the runner (C7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::types::{is_recoverable_os_code, SyncError};

/// Interval the pause kernel busy-waits at while suspended (§4.6 reference
/// value).
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Shared cancel flag, polled at every checkpoint.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise `SyncCancelled`-shaped error if cancellation was requested.
    /// Callers attach their own `partial_result`.
    pub fn check(&self) -> Result<(), ()> {
        if self.is_cancelled() {
            Err(())
        } else {
            Ok(())
        }
    }
}

/// Shared pause flag, polled at every checkpoint.
#[derive(Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self, paused: bool) {
        self.0.store(paused, Ordering::SeqCst);
    }

    pub fn toggle(&self) -> bool {
        let new_value = !self.is_paused();
        self.set(new_value);
        new_value
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Block the current (blocking-pool) thread until unpaused or cancelled,
/// invoking `on_tick` once per poll interval while paused so observers can
/// emit a `paused` progress event.
pub fn wait_while_paused(pause: &PauseToken, cancel: &CancelToken, mut on_tick: impl FnMut()) {
    while pause.is_paused() && !cancel.is_cancelled() {
        on_tick();
        std::thread::sleep(PAUSE_POLL_INTERVAL);
    }
}

/// Retry configuration (§4.6 / §6 `SyncOptions`).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(300),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms.max(50)),
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `operation`, retrying on recoverable OS errors up to
/// `config.max_attempts` additional times with exponential backoff.
/// Cancellation pre-empts any sleep. `on_retry` fires before each sleep
/// with `(attempt, delay, &error)` for progress emission.
pub fn retry_with_backoff<T>(
    config: &RetryConfig,
    cancel: &CancelToken,
    mut operation: impl FnMut() -> Result<T, SyncError>,
    mut on_retry: impl FnMut(u32, Duration, &SyncError),
) -> Result<T, SyncError> {
    let mut attempt = 0u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let recoverable = match &err {
                    SyncError::Filesystem { os_code, .. } => is_recoverable_os_code(*os_code),
                    _ => false,
                };
                if !recoverable || attempt >= config.max_attempts || cancel.is_cancelled() {
                    return Err(err);
                }
                let delay = config.delay_for_attempt(attempt);
                on_retry(attempt, delay, &err);
                if cancel.is_cancelled() {
                    return Err(err);
                }
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
