//! Bounded retry for flaky bus operations.

use holdfast_core::config::RetryConfig;
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// How many times to try an operation and how long to pause between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.attempts, config.delay())
    }
}

/// Every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempts: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Run `op` until it succeeds or the policy runs out of attempts.
///
/// `op` receives the 1-based attempt number. The pause happens between
/// attempts only, never after the last one.
///
/// # Examples
///
/// ```
/// use holdfast_hardware::retry::{self, RetryPolicy};
/// use std::time::Duration;
///
/// # #[tokio::main] async fn main() {
/// let policy = RetryPolicy::new(5, Duration::from_millis(1));
///
/// let value = retry::bounded(policy, async |attempt| {
///     if attempt < 3 { Err("not yet") } else { Ok(attempt) }
/// })
/// .await
/// .unwrap();
/// assert_eq!(value, 3);
///
/// let exhausted = retry::bounded(policy, async |_| Err::<(), _>("never"))
///     .await
///     .unwrap_err();
/// assert_eq!(exhausted.attempts, 5);
/// # }
/// ```
///
/// # Errors
///
/// Returns [`RetryExhausted`] carrying the final error once every attempt failed.
pub async fn bounded<T, E, F>(policy: RetryPolicy, mut op: F) -> Result<T, RetryExhausted<E>>
where
    F: AsyncFnMut(u32) -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(last_error) if attempt >= max_attempts => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error,
                });
            }
            Err(_) => {
                trace!(attempt, max_attempts, "Attempt failed, retrying");
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
