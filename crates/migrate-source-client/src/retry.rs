use std::future::Future;

use migrate_types::RetryPolicy;
use rand::Rng;

use crate::error::SourceError;

/// Retries `op` on transient errors with exponential backoff and jitter, up
/// to `policy.max_attempts`. Generalizes the restart backoff shape used
/// elsewhere in this codebase's model repo for flaky process supervision
/// (`2^restart_count` capped growth) into a jittered policy driven by
/// configuration rather than a hardcoded cap.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut backoff = policy.initial_backoff();
    let mut last_err = None;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::warn!(attempt, error = %err, "retrying transient source error");
                last_err = Some(err.to_string());
                if attempt < policy.max_attempts {
                    let jitter_ms = rand::thread_rng().gen_range(0..=(backoff.as_millis() as u64 / 4).max(1));
                    tokio::time::sleep(backoff + std::time::Duration::from_millis(jitter_ms)).await;
                    backoff = (backoff * 2).min(policy.backoff_cap());
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(SourceError::RetriesExhausted {
        attempts: policy.max_attempts,
        last: last_err.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_call_succeeds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_cap_ms: 10,
        };
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, SourceError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 1,
            backoff_cap_ms: 5,
        };
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(SourceError::Transient("connection refused".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_rejected_requests() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 1,
            backoff_cap_ms: 5,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Rejected {
                status: 409,
                body: "conflict".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(SourceError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_retries_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_cap_ms: 2,
        };
        let result: Result<(), _> = with_retry(&policy, || async {
            Err(SourceError::Transient("timeout".into()))
        })
        .await;

        assert!(matches!(
            result,
            Err(SourceError::RetriesExhausted { attempts: 3, .. })
        ));
    }
}
