//! Retry policy for backend calls.
//!
//! Only [`BackendError::Transient`] is retried; every other variant surfaces
//! immediately. The budget and backoff shape come from configuration, not
//! from per-call-site ad hoc loops.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::contract::BackendError;
use crate::error::SyncError;

/// Exponential backoff with an upper cap and optional jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter {
            rng.gen_range(0..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(16), true)
    }
}

/// How many attempts a single backend call gets, and how long to wait
/// between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::default(),
        }
    }
}

/// Runs `op`, retrying transient backend failures up to the policy budget.
///
/// `operation` names the call for logging and error context.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err @ BackendError::Transient { .. }) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(SyncError::Transient {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = policy.backoff.delay(attempt - 1);
                warn!(
                    operation = operation,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient backend failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn backoff_without_jitter_is_exponential() {
        let backoff = Backoff::new(
            Duration::from_millis(100),
            Duration::from_millis(800),
            false,
        );
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            backoff.delay_with_rng(0, &mut rng),
            Duration::from_millis(100)
        );
        assert_eq!(
            backoff.delay_with_rng(1, &mut rng),
            Duration::from_millis(200)
        );
        assert_eq!(
            backoff.delay_with_rng(2, &mut rng),
            Duration::from_millis(400)
        );
        assert_eq!(
            backoff.delay_with_rng(3, &mut rng),
            Duration::from_millis(800)
        );
        assert_eq!(
            backoff.delay_with_rng(4, &mut rng),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn backoff_with_jitter_is_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800), true);
        let mut rng = StdRng::seed_from_u64(42);
        let delay = backoff.delay_with_rng(3, &mut rng);
        assert!(delay <= Duration::from_millis(800));
    }

    #[tokio::test]
    async fn with_retry_surfaces_after_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(1), false),
        };
        let mut calls = 0u32;
        let result: Result<(), _> = with_retry(&policy, "create_page", || {
            calls += 1;
            async {
                Err(BackendError::Transient {
                    status: Some(503),
                    message: "unavailable".into(),
                })
            }
        })
        .await;
        assert_eq!(calls, 3);
        match result {
            Err(SyncError::Transient { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Transient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_gone() {
        let policy = RetryPolicy::new(5);
        let mut calls = 0u32;
        let result: Result<(), _> = with_retry(&policy, "get_resource", || {
            calls += 1;
            async { Err(BackendError::Gone("page-1".into())) }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(SyncError::Backend(_))));
    }
}
