//! Retry policy with exponential backoff
//!
//! The policy itself is pure: it maps an attempt number and an error class
//! to a decision. The only suspension point is [`Sleeper::sleep`], so tests
//! can swap in [`NoSleep`] and run retry loops instantly.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Default number of attempts (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for a single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// How an error should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Retry with backoff; `min_delay` carries a server-provided retry-after
    Transient { min_delay: Option<Duration> },
    /// Retry a single time, then give up
    RetryOnce,
    /// Never retry
    Terminal,
}

/// Errors that know whether they are worth retrying
pub trait Retryable {
    fn retry_class(&self) -> RetryClass;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling, first attempt included. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY.max(base_delay),
        }
    }

    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Decide what to do after `attempt` failed with an error of `class`
    pub fn decide(&self, class: RetryClass, attempt: u32, retried_once: bool) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        match class {
            RetryClass::Terminal => RetryDecision::GiveUp,
            RetryClass::RetryOnce if retried_once => RetryDecision::GiveUp,
            RetryClass::RetryOnce => RetryDecision::Retry(self.backoff_delay(attempt)),
            RetryClass::Transient { min_delay } => {
                let backoff = self.backoff_delay(attempt);
                RetryDecision::Retry(min_delay.map_or(backoff, |min| backoff.max(min)))
            }
        }
    }
}

/// Suspension seam for backoff delays
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately; for tests and dry runs
pub struct NoSleep;

#[async_trait::async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// Final result of a retried operation and how many attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds or the policy gives up.
///
/// `operation` receives the 1-based attempt number.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    E: Retryable + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    let mut retried_once = false;
    loop {
        attempt += 1;
        let error = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        let class = error.retry_class();
        match policy.decide(class, attempt, retried_once) {
            RetryDecision::GiveUp => {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }
            RetryDecision::Retry(delay) => {
                if class == RetryClass::RetryOnce {
                    retried_once = true;
                }
                warn!(
                    "{} failed on attempt {}/{}: {}. Retrying in {:?}",
                    label, attempt, policy.max_attempts, error, delay
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}
