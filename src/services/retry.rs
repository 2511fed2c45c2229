//! Bounded retry with a fixed delay
//!
//! Every attempt's failure is retried until the budget runs out; callers
//! that need to give up early wrap the future in a cancellation select.

use super::clock::Clock;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl RetryConfig {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Configuration allowing `attempts` tries in total (at least one)
    pub fn with_total_attempts(attempts: u32, delay: Duration) -> Self {
        Self::fixed(attempts.saturating_sub(1), delay)
    }

    /// Total number of attempts, first try included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Returned once every attempt has failed
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Execute an async closure with retry logic.
///
/// The closure receives the 1-based attempt number.
pub async fn with_retry<T, E, F, Fut>(
    clock: &dyn Clock,
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 1;

    loop {
        match f(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt >= max_attempts {
                    warn!(
                        "[Retry] {} failed after {} attempts: {}",
                        operation_name, attempt, err
                    );
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }

                debug!(
                    "[Retry] {} attempt {}/{} failed ({}), retrying in {:?}",
                    operation_name, attempt, max_attempts, err, config.delay
                );

                clock.sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}
