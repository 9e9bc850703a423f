//! Bounded retries with jittered exponential backoff.
//!
//! Both external calls of the pipeline (secret store and identity provider) go
//! through [`retry_with_backoff`]. Unlike an open-ended retry loop, every call
//! here is bounded twice: by a maximum number of attempts and by the
//! invocation [`Deadline`]. When the next backoff would cross the deadline the
//! loop gives up immediately so the caller can still answer in time.

use log::{debug, warn};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// Retry settings for one kind of external call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for the doubled delay
    pub max_delay: Duration,
    /// Time allowed for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt budget and per-attempt timeout
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            attempt_timeout,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Point in time by which an invocation must have produced its answer
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Why a single attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    Failed(E),
    TimedOut(Duration),
}

impl<E: Display> Display for AttemptError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err}"),
            Self::TimedOut(after) => write!(f, "timed out after {}ms", after.as_millis()),
        }
    }
}

/// Terminal outcome of a retried operation that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt of the budget failed transiently
    Exhausted { attempts: u32, last: AttemptError<E> },
    /// The operation failed with an error that retrying cannot fix
    Rejected(E),
    /// No time left for another attempt
    DeadlineExceeded,
}

/// Runs `operation` until it succeeds, fails permanently, runs out of
/// attempts or runs out of time.
///
/// `is_transient` decides which errors are worth another attempt. Attempt
/// timeouts are always treated as transient.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    deadline: &Deadline,
    operation_name: &str,
    is_transient: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let remaining = deadline.remaining();
        if remaining.is_zero() {
            warn!("{operation_name}: deadline reached before attempt {attempt}");
            return Err(RetryError::DeadlineExceeded);
        }
        let attempt_budget = policy.attempt_timeout.min(remaining);

        let last = match tokio::time::timeout(attempt_budget, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!("{operation_name}: succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Ok(Err(err)) if !is_transient(&err) => return Err(RetryError::Rejected(err)),
            Ok(Err(err)) => AttemptError::Failed(err),
            Err(_) => AttemptError::TimedOut(attempt_budget),
        };

        if attempt >= max_attempts {
            warn!("{operation_name}: giving up after {attempt} attempt(s): {last}");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last,
            });
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        if jittered >= deadline.remaining() {
            warn!("{operation_name}: no time left to retry after attempt {attempt}: {last}");
            return Err(RetryError::DeadlineExceeded);
        }

        warn!(
            "{operation_name}: attempt {attempt} failed, retrying in {}ms: {last}",
            jittered.as_millis()
        );
        tokio::time::sleep(jittered).await;
        delay = (delay * 2).min(policy.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(200))
            .with_initial_delay(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, RetryError<String>> = retry_with_backoff(
            &fast_policy(3),
            &Deadline::after(Duration::from_secs(2)),
            "op",
            |_| true,
            || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
            },
        )
        .await;

        assert_eq!(result, Ok(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_at_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &fast_policy(2),
            &Deadline::after(Duration::from_secs(2)),
            "op",
            |_| true,
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            },
        )
        .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: AttemptError::Failed("boom".to_string()),
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &fast_policy(5),
            &Deadline::after(Duration::from_secs(2)),
            "op",
            |_| false,
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("not found".to_string()) }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Rejected("not found".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempts_time_out() {
        let policy = RetryPolicy::new(2, Duration::from_millis(20))
            .with_initial_delay(Duration::from_millis(5));
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &policy,
            &Deadline::after(Duration::from_secs(2)),
            "op",
            |_| true,
            || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: AttemptError::TimedOut(_)
            })
        ));
    }

    #[tokio::test]
    async fn test_does_not_retry_past_deadline() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50))
            .with_initial_delay(Duration::from_millis(400));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &policy,
            &Deadline::after(Duration::from_millis(150)),
            "op",
            |_| true,
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("unreachable".to_string()) }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::DeadlineExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_deadline() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
