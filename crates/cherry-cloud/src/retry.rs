//! Retry with exponential backoff and jittered polling
//!
//! `retry` re-runs an operation while it fails with a transient error.
//! `Poller` re-checks a condition at a constant delay plus random jitter until
//! it holds, the attempt budget runs out, or the caller cancels.

use crate::error::{CloudError, Result};
use crate::provider::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Random duration from the half-open interval `[min, max)`.
///
/// Returns `min` when the interval is empty.
pub fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_nanos() as u64;
    min + Duration::from_nanos(rand::thread_rng().gen_range(0..span))
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is exhausted.
pub async fn retry<T, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = config.delay_for_attempt(attempt)
                    + jitter_between(Duration::ZERO, config.max_jitter);
                tracing::debug!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label,
                    attempt + 1,
                    max_attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::debug!("{} giving up after {} attempts: {}", label, attempt + 1, e);
                }
                return Err(e);
            }
        }
    }
}

/// Poll configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Constant delay between checks
    pub delay: Duration,

    /// Jitter interval added on top of the delay
    pub min_jitter: Duration,
    pub max_jitter: Duration,

    /// Maximum number of checks, including the immediate first one
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            min_jitter: Duration::from_secs(1),
            max_jitter: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

/// Condition poller
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollConfig,
}

impl Poller {
    pub fn new(config: PollConfig) -> Result<Self> {
        if config.min_jitter > config.max_jitter {
            return Err(CloudError::InvalidConfig(format!(
                "min jitter {:?} can't be bigger than max jitter {:?}",
                config.min_jitter, config.max_jitter
            )));
        }
        Ok(Self { config })
    }

    fn next_delay(&self) -> Duration {
        self.config.delay + jitter_between(self.config.min_jitter, self.config.max_jitter)
    }

    /// Poll until `check` yields `Some`, returns an error, or the budget runs out.
    ///
    /// The first check runs immediately unless the token is already cancelled.
    pub async fn until<T, F, Fut>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(CloudError::Cancelled(format!(
                    "cancelled before {} was fulfilled",
                    what
                )));
            }

            if let Some(value) = check().await? {
                return Ok(value);
            }

            if attempt + 1 < max_attempts {
                let delay = self.next_delay();
                tracing::debug!("waiting {:?} for {}", delay, what);
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(CloudError::Cancelled(format!(
                            "cancelled before {} was fulfilled",
                            what
                        )));
                    }
                }
            }
        }

        Err(CloudError::Timeout(format!(
            "{} not fulfilled after {} checks",
            what, max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_jitter: Duration::ZERO,
        }
    }

    fn fast_poll(max_attempts: u32) -> PollConfig {
        PollConfig {
            delay: Duration::from_millis(1),
            min_jitter: Duration::ZERO,
            max_jitter: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[test]
    fn test_jitter_within_interval() {
        let min = Duration::from_millis(10);
        let max = Duration::from_millis(20);
        for _ in 0..100 {
            let j = jitter_between(min, max);
            assert!(j >= min && j < max);
        }
        assert_eq!(jitter_between(max, min), max);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(&fast_retry(3), "get project", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CloudError::Remote {
                        status: Some(503),
                        detail: "unavailable".to_string(),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry(&fast_retry(2), "get project", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::Remote {
                    status: None,
                    detail: "timed out".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(CloudError::Remote { status: None, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_never_retries_conflict() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry(&fast_retry(5), "update project", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::Conflict("changed remotely".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(CloudError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poller_until_condition() {
        let poller = Poller::new(fast_poll(10)).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = poller
            .until("asn assignment", &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(if n >= 2 { Some(65000) } else { None })
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 65000);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poller_times_out() {
        let poller = Poller::new(fast_poll(3)).unwrap();

        let result: Result<u32> = poller
            .until("asn assignment", &CancellationToken::new(), || async {
                Ok(None)
            })
            .await;

        assert!(matches!(result, Err(CloudError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_poller_respects_cancellation() {
        let poller = Poller::new(fast_poll(3)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<u32> = poller
            .until("asn assignment", &cancel, || async { Ok(Some(1)) })
            .await;

        assert!(matches!(result, Err(CloudError::Cancelled(_))));
    }

    #[test]
    fn test_poller_rejects_inverted_jitter() {
        let config = PollConfig {
            min_jitter: Duration::from_secs(2),
            max_jitter: Duration::from_secs(1),
            ..PollConfig::default()
        };
        assert!(Poller::new(config).is_err());
    }
}
