use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::encoder::ImagePart;
use crate::error::{is_transient, GenerationError};
use crate::model::ImageModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `max_retries + 1` calls at most.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`: 4s, 8s, 16s, 32s, 64s with the defaults.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Suspension point for backoff and pacing waits.
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryNotice<'a> {
    /// Zero-based index of the attempt that just failed.
    pub attempt: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub error: &'a GenerationError,
}

/// Calls `model` until it succeeds, fails fatally, or the retry budget is
/// spent. Only [`is_transient`] failures are retried; the last error is
/// returned unchanged.
pub fn generate_with_retry(
    model: &dyn ImageModel,
    parts: &[ImagePart],
    prompt: &str,
    policy: &RetryPolicy,
    pause: &dyn Pause,
    cancel: &CancelFlag,
    mut on_retry: impl FnMut(RetryNotice<'_>),
) -> Result<String, GenerationError> {
    let mut attempt: u32 = 0;
    loop {
        match model.generate(parts, prompt) {
            Ok(url) => return Ok(url),
            Err(err) => {
                if !is_transient(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                if cancel.is_cancelled() {
                    return Err(GenerationError::Cancelled);
                }
                let delay = policy.delay_for(attempt);
                on_retry(RetryNotice {
                    attempt,
                    max_retries: policy.max_retries,
                    delay,
                    error: &err,
                });
                pause.pause(delay);
                attempt += 1;
            }
        }
    }
}
