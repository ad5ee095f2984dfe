use std::future::Future;
use std::time::Duration;

use migrate_metadata::{MemoryMetadataStore, MetadataError, MetadataTxn};
use migrate_types::RetryPolicy;

/// Runs one metadata transaction, retrying on `LeaseExpired` per `policy`
/// (spec.md §9, "a failed commit is retried from the same resumeFrom"; §5,
/// "exceeding the lease aborts the transaction and the caller retries under
/// the configured retry policy"). Any other error is fatal and returned
/// immediately.
pub async fn transact_with_retry<F, T>(
    store: &MemoryMetadataStore,
    lease: Duration,
    policy: &RetryPolicy,
    mut body: F,
) -> Result<T, MetadataError>
where
    F: FnMut(&mut MetadataTxn<'_>) -> Result<T, MetadataError> + Send,
    T: Send,
{
    let mut backoff = policy.initial_backoff();

    for attempt in 1..=policy.max_attempts {
        match store.transaction(lease, &mut body).await {
            Ok(value) => return Ok(value),
            Err(MetadataError::LeaseExpired) if attempt < policy.max_attempts => {
                tracing::warn!(attempt, "metadata transaction lease expired, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.backoff_cap());
            }
            Err(other) => return Err(other),
        }
    }

    unreachable!("loop always returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_cap_ms: 2,
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_retry() {
        let store = MemoryMetadataStore::new();
        let calls = AtomicU32::new(0);
        let result = transact_with_retry(&store, Duration::from_secs(1), &fast_policy(), |txn| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(txn.get_or_add("k", "v"))
        })
        .await;

        assert_eq!(result.unwrap(), "v");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn propagates_corruption_without_retrying() {
        let store = MemoryMetadataStore::new();
        store
            .transaction(Duration::from_secs(1), |txn| {
                Ok(txn.get_or_add("n", "not-a-number"))
            })
            .await
            .unwrap();

        let calls = AtomicU32::new(0);
        let result = transact_with_retry(&store, Duration::from_secs(1), &fast_policy(), |txn| {
            calls.fetch_add(1, Ordering::SeqCst);
            txn.get_long("n")
        })
        .await;

        assert!(matches!(result, Err(MetadataError::Corrupt { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
