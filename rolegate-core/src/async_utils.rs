//! Async utilities and patterns
//!
//! Provides retry logic, timeouts and single-flight request sharing

use crate::error::{ErrorContext, RolegateError, RolegateResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Errors that are not recoverable are returned at once. The wait before a
/// retry is never shorter than the error's own `retry_delay_ms` hint, capped at
/// `max_delay_ms`.
pub async fn retry_async<F, T>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> RolegateResult<T>
where
    F: Fn() -> BoxFuture<'static, RolegateResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;

        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = config.max_attempts,
            "Attempting operation"
        );

        let error = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => error,
        };

        if !error.is_recoverable() {
            error!(
                operation = operation_name,
                attempt = attempt,
                error = %error,
                "Operation failed with a non-recoverable error"
            );
            return Err(error);
        }

        if attempt >= config.max_attempts {
            error!(
                operation = operation_name,
                attempt = attempt,
                error = %error,
                "Operation failed after all retry attempts"
            );
            return Err(error);
        }

        let wait = delay
            .max(error.retry_delay_ms().unwrap_or(0))
            .min(config.max_delay_ms);
        warn!(
            operation = operation_name,
            attempt = attempt,
            error = %error,
            delay_ms = wait,
            "Operation failed, retrying"
        );

        let actual_delay = if config.jitter {
            let jitter_factor = 0.1;
            let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
            ((wait as f64) * (1.0 + jitter)) as u64
        } else {
            wait
        };

        sleep(Duration::from_millis(actual_delay)).await;

        delay = ((delay as f64) * config.backoff_multiplier) as u64;
        delay = delay.min(config.max_delay_ms);
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(
    future: F,
    timeout_ms: u64,
    operation_name: &str,
) -> RolegateResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(RolegateError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase session.refresh_timeout_ms")
                .with_suggestion("Check that the token store is reachable"),
        }),
    }
}

/// Shares one in-flight computation between concurrent callers.
///
/// The first caller starts the future; callers arriving while it runs await the
/// same result. Once it completes the slot is released and the next call starts
/// a fresh computation.
pub struct SingleFlight<T: Clone> {
    slot: Mutex<Option<(u64, Shared<BoxFuture<'static, T>>)>>,
    next_id: Mutex<u64>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: Mutex::new(0),
        }
    }

    /// Run `start()` unless a call is already in flight, then await the shared result
    pub async fn run<F>(&self, start: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let (id, shared, joined) = {
            let mut slot = lock(&self.slot);
            match slot.as_ref() {
                Some((id, shared)) => (*id, shared.clone(), true),
                None => {
                    let id = {
                        let mut next_id = lock(&self.next_id);
                        *next_id += 1;
                        *next_id
                    };
                    let shared = start().shared();
                    *slot = Some((id, shared.clone()));
                    (id, shared, false)
                }
            }
        };

        if joined {
            debug!(flight = id, "Joining in-flight request");
        }

        let result = shared.await;

        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }

        result
    }

    /// Whether a computation is currently in flight
    pub fn is_in_flight(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Drop the in-flight computation. Callers already awaiting it keep their clone.
    pub fn forget(&self) {
        lock(&self.slot).take();
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned slot only means another caller panicked mid-update; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn single_flight_shares_concurrent_calls() {
        let flight = Arc::new(SingleFlight::<usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run(move || {
                        async move {
                            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                            sleep(Duration::from_millis(50)).await;
                            n
                        }
                        .boxed()
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.is_in_flight());
    }

    #[tokio::test]
    async fn single_flight_starts_fresh_after_completion() {
        let flight = SingleFlight::<u32>::new();
        assert_eq!(flight.run(|| async { 1 }.boxed()).await, 1);
        assert_eq!(flight.run(|| async { 2 }.boxed()).await, 2);
    }
}
