use chrono::Utc;
use futures::StreamExt;
use migrate_metadata::MemoryMetadataStore;
use migrate_source_client::{Record, SourceClient};
use migrate_types::{fields, worker_key, MigrationSettings, PhaseKind, WorkerInput, WorkerResult, WorkerStatus};
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::provider::DestinationStateProvider;
use crate::retry::transact_with_retry;

/// Runs one `(phase, iter, worker_id)` slice of a migration (spec.md §4.3).
/// Borrows everything it needs rather than owning it, since `PhaseWorkload`
/// drives a whole fleet of these concurrently within a single task via
/// `futures::future::join_all` (spec.md §5: workers are I/O bound, so
/// concurrent polling gives the required parallelism without per-worker
/// OS threads or an `Arc`-everything API).
pub struct MigrationWorker<'a> {
    metadata: &'a MemoryMetadataStore,
    source: &'a dyn SourceClient,
    destination: &'a dyn DestinationStateProvider,
    settings: &'a MigrationSettings,
    phase: PhaseKind,
}

impl<'a> MigrationWorker<'a> {
    pub fn new(
        metadata: &'a MemoryMetadataStore,
        source: &'a dyn SourceClient,
        destination: &'a dyn DestinationStateProvider,
        settings: &'a MigrationSettings,
        phase: PhaseKind,
    ) -> Self {
        Self {
            metadata,
            source,
            destination,
            settings,
            phase,
        }
    }

    /// Runs `input` to completion, resuming from whatever checkpoint is
    /// already persisted for this worker. Cancellation-observant at every
    /// suspension point per spec.md §5.
    #[tracing::instrument(skip_all, fields(phase = %self.phase, worker_id = input.worker_id))]
    pub async fn run(
        &self,
        input: &WorkerInput,
        cancel: &CancellationToken,
    ) -> Result<WorkerResult, WorkerError> {
        if input.status == WorkerStatus::Completed {
            return self.read_persisted_result(input).await;
        }

        let last_applied_key = worker_key(fields::LAST_APPLIED_SEQ_NUM, self.phase, input.worker_id);
        let keys_migrated_key = worker_key(fields::NO_OF_KEYS_MIGRATED, self.phase, input.worker_id);

        let last_applied_sn = self
            .metadata
            .transaction(self.settings.metadata_lease(), |txn| {
                txn.get_long_or_default(&last_applied_key)
            })
            .await?;
        let keys_migrated_so_far = self
            .metadata
            .transaction(self.settings.metadata_lease(), |txn| {
                Ok(txn.get_long_or_default(&keys_migrated_key)?.unwrap_or(0))
            })
            .await?;

        let resume_from = last_applied_sn.map_or(input.start_sn, |sn| sn + 1);

        let mut last_applied_sn = last_applied_sn;
        let mut keys_migrated = keys_migrated_so_far;

        if resume_from <= input.end_sn {
            let mut stream = self.source.enumerate_keys(resume_from, input.end_sn).await?;
            let batch_size = self.settings.worker_batch_size as usize;
            let mut batch: Vec<Record> = Vec::with_capacity(batch_size);

            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return Err(WorkerError::Cancelled);
                    }
                    item = stream.next() => item,
                };

                match next {
                    Some(record) => {
                        batch.push(record?);
                        if batch.len() >= batch_size {
                            let applied = self.commit_batch(
                                input.worker_id,
                                &last_applied_key,
                                &keys_migrated_key,
                                std::mem::take(&mut batch),
                            )
                            .await?;
                            last_applied_sn = Some(applied.0);
                            keys_migrated = applied.1;
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            let applied = self.commit_batch(
                                input.worker_id,
                                &last_applied_key,
                                &keys_migrated_key,
                                std::mem::take(&mut batch),
                            )
                            .await?;
                            last_applied_sn = Some(applied.0);
                            keys_migrated = applied.1;
                        }
                        break;
                    }
                }
            }
        }

        let ended_at = Utc::now();
        self.mark_completed(input.worker_id).await?;

        Ok(WorkerResult {
            worker_id: input.worker_id,
            status: WorkerStatus::Completed,
            started_at: input.started_at,
            ended_at: Some(ended_at),
            start_sn: input.start_sn,
            end_sn: input.end_sn,
            last_applied_sn,
            keys_migrated,
        })
    }

    /// Applies one batch to the destination, then checkpoints it in the
    /// metadata store as a separate step. These are not a single atomic
    /// transaction across both stores: if the process crashes between the
    /// apply and the checkpoint, the resumed worker re-applies the same SN
    /// range, which the destination's apply is expected to absorb
    /// idempotently (last-write-wins per key, same as a plain replay).
    /// `resumeFrom` itself only ever advances on a successful checkpoint.
    async fn commit_batch(
        &self,
        worker_id: u32,
        last_applied_key: &str,
        keys_migrated_key: &str,
        batch: Vec<Record>,
    ) -> Result<(i64, i64), WorkerError> {
        let highest_sn = batch
            .last()
            .expect("commit_batch is only called with a non-empty batch")
            .sn;
        let batch_len = batch.len() as i64;

        self.destination
            .apply_batch(&batch)
            .await
            .map_err(WorkerError::Apply)?;

        let (last_applied_sn, keys_migrated) = transact_with_retry(
            self.metadata,
            self.settings.metadata_lease(),
            &self.settings.retry_policy,
            |txn| {
                let applied = txn
                    .add_or_update(last_applied_key, highest_sn.to_string(), |_| {
                        highest_sn.to_string()
                    })
                    .parse::<i64>()
                    .expect("LastAppliedSeqNum is always written as an i64");
                let migrated = txn
                    .add_or_update(keys_migrated_key, batch_len.to_string(), |old| {
                        let old: i64 = old.parse().unwrap_or(0);
                        (old + batch_len).to_string()
                    })
                    .parse::<i64>()
                    .expect("NoOfKeysMigrated is always written as an i64");
                Ok((applied, migrated))
            },
        )
        .await?;

        tracing::debug!(worker_id, last_applied_sn, keys_migrated, "checkpointed batch");
        Ok((last_applied_sn, keys_migrated))
    }

    async fn mark_completed(&self, worker_id: u32) -> Result<(), WorkerError> {
        let status_key = worker_key(fields::CURRENT_STATUS, self.phase, worker_id);
        let end_dt_key = worker_key(fields::END_DATETIME_UTC, self.phase, worker_id);
        let now = Utc::now().to_rfc3339();

        transact_with_retry(
            self.metadata,
            self.settings.metadata_lease(),
            &self.settings.retry_policy,
            |txn| {
                txn.add_or_update(&status_key, WorkerStatus::Completed.to_string(), |_| {
                    WorkerStatus::Completed.to_string()
                });
                txn.add_or_update(&end_dt_key, now.clone(), |_| now.clone());
                Ok(())
            },
        )
        .await?;
        Ok(())
    }

    async fn read_persisted_result(&self, input: &WorkerInput) -> Result<WorkerResult, WorkerError> {
        let last_applied_key = worker_key(fields::LAST_APPLIED_SEQ_NUM, self.phase, input.worker_id);
        let keys_migrated_key = worker_key(fields::NO_OF_KEYS_MIGRATED, self.phase, input.worker_id);
        let end_dt_key = worker_key(fields::END_DATETIME_UTC, self.phase, input.worker_id);

        self.metadata
            .transaction(self.settings.metadata_lease(), |txn| {
                let last_applied_sn = txn.get_long_or_default(&last_applied_key)?;
                let keys_migrated = txn.get_long_or_default(&keys_migrated_key)?.unwrap_or(0);
                let ended_at = txn
                    .get_or_default(&end_dt_key)
                    .map(|raw| migrate_types::parse_timestamp(&raw))
                    .transpose()
                    .map_err(|source| migrate_metadata::MetadataError::Corrupt {
                        key: end_dt_key.clone(),
                        source,
                    })?;

                Ok(WorkerResult {
                    worker_id: input.worker_id,
                    status: WorkerStatus::Completed,
                    started_at: input.started_at,
                    ended_at,
                    start_sn: input.start_sn,
                    end_sn: input.end_sn,
                    last_applied_sn,
                    keys_migrated,
                })
            })
            .await
            .map_err(WorkerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrate_source_client::testing::FakeSourceClient;
    use migrate_types::RetryPolicy;

    fn settings() -> MigrationSettings {
        MigrationSettings {
            worker_batch_size: 2,
            retry_policy: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                backoff_cap_ms: 2,
            },
            ..Default::default()
        }
    }

    fn input(worker_id: u32, start_sn: i64, end_sn: i64) -> WorkerInput {
        WorkerInput {
            worker_id,
            phase: Some(PhaseKind::Copy),
            start_sn,
            end_sn,
            started_at: Utc::now(),
            status: WorkerStatus::InProgress,
        }
    }

    fn record(sn: i64) -> Record {
        Record {
            sn,
            key: format!("k{sn}"),
            value: format!("v{sn}").into_bytes(),
        }
    }

    #[tokio::test]
    async fn applies_all_records_in_range_and_marks_completed() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 10);
        for sn in 1..=5 {
            source.push_record(record(sn));
        }
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();
        let worker = MigrationWorker::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();

        let result = worker.run(&input(1, 1, 5), &cancel).await.unwrap();

        assert_eq!(result.status, WorkerStatus::Completed);
        assert_eq!(result.last_applied_sn, Some(5));
        assert_eq!(result.keys_migrated, 5);
        assert_eq!(destination.applied_count(), 5);
    }

    #[tokio::test]
    async fn empty_range_completes_immediately_with_no_records() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 0);
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();
        let worker = MigrationWorker::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();

        let result = worker.run(&input(2, 501, 500), &cancel).await.unwrap();

        assert_eq!(result.status, WorkerStatus::Completed);
        assert_eq!(result.last_applied_sn, None);
        assert_eq!(result.keys_migrated, 0);
    }

    #[tokio::test]
    async fn resumes_from_the_persisted_checkpoint_not_from_start_sn() {
        // S4: worker 2 committed LastAppliedSeqNum=500 before a simulated
        // failover; a fresh worker instance must resume at SN 501.
        let metadata = MemoryMetadataStore::new();
        metadata
            .transaction(std::time::Duration::from_secs(1), |txn| {
                Ok(txn.get_or_add(
                    &worker_key(fields::LAST_APPLIED_SEQ_NUM, PhaseKind::Copy, 2),
                    "500",
                ))
            })
            .await
            .unwrap();

        let source = FakeSourceClient::new(1, 1000);
        for sn in 496..=750 {
            source.push_record(record(sn));
        }
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();
        let worker = MigrationWorker::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();

        let result = worker.run(&input(2, 251, 750), &cancel).await.unwrap();

        assert_eq!(result.last_applied_sn, Some(750));
        // Only SNs 501..=750 should ever have reached the destination.
        assert_eq!(destination.applied_count(), 250);
        assert!(destination.get("k500").is_none());
        assert!(destination.get("k501").is_some());
    }

    #[tokio::test]
    async fn completed_workers_are_skipped_and_return_the_persisted_result() {
        let metadata = MemoryMetadataStore::new();
        let status_key = worker_key(fields::CURRENT_STATUS, PhaseKind::Copy, 1);
        let last_applied_key = worker_key(fields::LAST_APPLIED_SEQ_NUM, PhaseKind::Copy, 1);
        let keys_migrated_key = worker_key(fields::NO_OF_KEYS_MIGRATED, PhaseKind::Copy, 1);
        metadata
            .transaction(std::time::Duration::from_secs(1), |txn| {
                txn.get_or_add(&status_key, WorkerStatus::Completed.to_string());
                txn.get_or_add(&last_applied_key, "250");
                txn.get_or_add(&keys_migrated_key, "250");
                Ok(())
            })
            .await
            .unwrap();

        let source = FakeSourceClient::new(1, 1000);
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();
        let worker = MigrationWorker::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();

        let mut completed_input = input(1, 1, 250);
        completed_input.status = WorkerStatus::Completed;
        let result = worker.run(&completed_input, &cancel).await.unwrap();

        assert_eq!(result.keys_migrated, 250);
        assert_eq!(destination.applied_count(), 0, "a completed worker must not re-apply records");
    }

    #[tokio::test]
    async fn apply_rejection_fails_the_worker() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 10);
        for sn in 1..=5 {
            source.push_record(record(sn));
        }
        let destination = crate::provider::testing::MemoryStateProvider::new();
        destination.reject_sn(3);
        let settings = settings();
        let worker = MigrationWorker::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();

        let result = worker.run(&input(1, 1, 5), &cancel).await;
        assert!(matches!(result, Err(WorkerError::Apply(_))));
    }

    #[tokio::test]
    async fn cancellation_is_observed_promptly() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 10);
        for sn in 1..=5 {
            source.push_record(record(sn));
        }
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();
        let worker = MigrationWorker::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = worker.run(&input(1, 1, 5), &cancel).await;
        assert!(matches!(result, Err(WorkerError::Cancelled)));
    }
}
