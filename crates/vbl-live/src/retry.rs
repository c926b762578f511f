//! Bounded exponential backoff with jitter for external I/O.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use vbl_domain::DomainError;

/// Retry policy for broker and market-data calls.
///
/// Safe to apply to broker submission because the client order id doubles
/// as an idempotency token, so a retried submit can never create a
/// duplicate order at the venue.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_attempts: 4,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single-attempt policy (tests, reconciliation sweeps).
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 1,
            jitter: false,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        if self.jitter && !capped.is_zero() {
            // Full jitter: uniform in [0, capped].
            let micros = capped.as_micros() as u64;
            Duration::from_micros(rand::thread_rng().gen_range(0..=micros))
        } else {
            capped
        }
    }

    /// Run `op` until it succeeds, fails non-retryably, or attempts are
    /// exhausted. Only transport-level failures are retried.
    pub async fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Result<T, DomainError>,
    {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if is_retryable(&e) && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(what, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(e: &DomainError) -> bool {
    matches!(
        e,
        DomainError::BrokerUnreachable { .. } | DomainError::PriceUnavailable { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_attempts: 3,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(DomainError::BrokerUnreachable { message: "down".into() })
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run("test", || -> Result<(), DomainError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DomainError::BrokerUnreachable { message: "down".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::BrokerUnreachable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run("test", || -> Result<(), DomainError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DomainError::BrokerRejected { message: "no".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::BrokerRejected { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
