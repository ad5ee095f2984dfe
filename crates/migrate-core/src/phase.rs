use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use migrate_metadata::{MemoryMetadataStore, MetadataError};
use migrate_source_client::SourceClient;
use migrate_types::{
    fields, global, phase_iteration_key, phase_key, parse_timestamp, partition_range, worker_key,
    MigrationSettings, PhaseInput, PhaseKind, PhaseResult, WorkerInput, WorkerResult, WorkerStatus,
};
use tokio_util::sync::CancellationToken;

use crate::error::PhaseError;
use crate::provider::DestinationStateProvider;
use crate::retry::transact_with_retry;
use crate::util::{parse_long_or_corrupt, parse_or_corrupt, parse_timestamp_or_corrupt};
use crate::worker::MigrationWorker;

/// One `(phase, iter)` invocation (spec.md §4.4): plans its own input under
/// `getOrAdd` semantics, fans its workers out, and commits the aggregate
/// result. A fresh instance is constructed per phase iteration by the
/// orchestrator; nothing here survives across phases.
pub struct PhaseWorkload<'a> {
    metadata: &'a MemoryMetadataStore,
    source: &'a dyn SourceClient,
    destination: &'a dyn DestinationStateProvider,
    settings: &'a MigrationSettings,
    phase: PhaseKind,
}

impl<'a> PhaseWorkload<'a> {
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

    /// Plans (if not already planned) and runs this phase to completion,
    /// fanning workers out concurrently and committing the aggregate
    /// result. `previous_end_sn` is the prior phase's `endSN`; required for
    /// every phase except `Copy`.
    pub async fn start_or_resume(
        &self,
        previous_end_sn: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<PhaseResult, PhaseError> {
        let input = self.get_or_add_input(previous_end_sn).await?;
        tracing::info!(
            phase = %self.phase,
            start_sn = input.start_sn,
            end_sn = input.end_sn,
            worker_count = input.worker_count,
            "phase planned",
        );

        let worker = MigrationWorker::new(self.metadata, self.source, self.destination, self.settings, self.phase);
        let runs = input.worker_inputs.iter().map(|wi| worker.run(wi, cancel));
        let outcomes = futures::future::join_all(runs).await;

        let mut worker_results: Vec<WorkerResult> = Vec::with_capacity(outcomes.len());
        for (worker_input, outcome) in input.worker_inputs.iter().zip(outcomes) {
            match outcome {
                Ok(result) => worker_results.push(result),
                Err(crate::error::WorkerError::Cancelled) => return Err(PhaseError::Cancelled),
                Err(source) => {
                    return Err(PhaseError::Worker {
                        worker_id: worker_input.worker_id,
                        source,
                    })
                }
            }
        }

        let keys_migrated: i64 = worker_results.iter().map(|w| w.keys_migrated).sum();
        let ended_at = Utc::now();
        self.record_completion(input.end_sn, keys_migrated, ended_at).await?;

        Ok(PhaseResult {
            phase: self.phase.phase(),
            iter: self.phase.iter(),
            status: WorkerStatus::Completed,
            started_at: input.started_at,
            ended_at: Some(ended_at),
            start_sn: input.start_sn,
            end_sn: input.end_sn,
            last_applied_sn: Some(input.end_sn),
            keys_migrated,
            worker_results,
        })
    }

    /// Planning transaction (spec.md §4.4 `getOrAddInput`). Expressed as a
    /// sequence of short metadata transactions rather than one giant one,
    /// since `computeStartSN`/`computeEndSN` need to await the source
    /// client in between reads — both are themselves named suspension
    /// points in spec.md §5. Correctness under concurrent resumes comes
    /// entirely from `get_or_add`, not from planning being one atomic unit;
    /// §5 guarantees at most one active orchestrator task, so there is no
    /// concurrent planner to race against.
    async fn get_or_add_input(&self, previous_end_sn: Option<i64>) -> Result<PhaseInput, PhaseError> {
        let lease = self.settings.metadata_lease();
        let phase_name = self.phase.phase();

        self.metadata
            .transaction(lease, |txn| {
                Ok(txn.add_or_update(global::MIGRATION_CURRENT_PHASE, phase_name.to_string(), |_| {
                    phase_name.to_string()
                }))
            })
            .await?;

        let started_key = phase_key(fields::START_DATETIME_UTC, self.phase);
        let now = Utc::now().to_rfc3339();
        let started_raw = self
            .metadata
            .transaction(lease, |txn| Ok(txn.get_or_add(&started_key, now.clone())))
            .await?;
        let started_at: DateTime<Utc> = parse_timestamp_or_corrupt(&started_raw, &started_key)?;

        let status_key = phase_key(fields::CURRENT_STATUS, self.phase);
        self.metadata
            .transaction(lease, |txn| {
                Ok(txn.get_or_add(&status_key, WorkerStatus::InProgress.to_string()))
            })
            .await?;

        let start_key = phase_key(fields::START_SEQ_NUM, self.phase);
        let start_sn = self
            .get_or_add_computed(&start_key, self.compute_start_sn(previous_end_sn))
            .await?;

        self.metadata
            .transaction(lease, |txn| {
                Ok(txn.get_or_add(global::MIGRATION_START_SEQ_NUM, start_sn.to_string()))
            })
            .await?;

        let end_key = phase_key(fields::END_SEQ_NUM, self.phase);
        let end_sn = self.get_or_add_computed(&end_key, self.compute_end_sn()).await?;

        let iteration_key = phase_iteration_key(self.phase.phase());
        let iter = self.phase.iter();
        self.metadata
            .transaction(lease, |txn| {
                Ok(txn.add_or_update(&iteration_key, iter.to_string(), |_| iter.to_string()))
            })
            .await?;

        let worker_count = self.settings.worker_count_for(self.phase);
        let worker_count_key = phase_key(fields::WORKER_COUNT, self.phase);
        self.metadata
            .transaction(lease, |txn| {
                Ok(txn.get_or_add(&worker_count_key, worker_count.to_string()))
            })
            .await?;

        let ranges = partition_range(start_sn, end_sn, worker_count);
        let mut worker_inputs = Vec::with_capacity(ranges.len());
        for (i, (range_start, range_end)) in ranges.into_iter().enumerate() {
            let worker_id = i as u32 + 1;
            worker_inputs.push(self.get_or_add_worker(worker_id, range_start, range_end).await?);
        }

        Ok(PhaseInput {
            phase: self.phase,
            start_sn,
            end_sn,
            worker_count,
            started_at,
            worker_inputs,
        })
    }

    /// `getOrAdd(key, compute())`, but only evaluates `compute` (an async
    /// source call) when the key is not already planned — `get_or_add`
    /// itself cannot await, so the absence check and the seed insert are
    /// two separate transactions around one conditional `compute` call.
    async fn get_or_add_computed(
        &self,
        key: &str,
        compute: impl Future<Output = Result<i64, PhaseError>>,
    ) -> Result<i64, PhaseError> {
        let lease = self.settings.metadata_lease();
        let existing = self.metadata.transaction(lease, |txn| txn.get_long_or_default(key)).await?;
        if let Some(value) = existing {
            return Ok(value);
        }

        let seed = compute.await?;
        let stored = self
            .metadata
            .transaction(lease, |txn| Ok(txn.get_or_add(key, seed.to_string())))
            .await?;
        parse_long_or_corrupt(&stored, key).map_err(PhaseError::from)
    }

    async fn compute_start_sn(&self, previous_end_sn: Option<i64>) -> Result<i64, PhaseError> {
        match self.phase {
            PhaseKind::Copy => {
                let last_applied = self
                    .metadata
                    .transaction(self.settings.metadata_lease(), |txn| {
                        txn.get_long_or_default(global::MIGRATION_LAST_APPLIED_SEQ_NUM)
                    })
                    .await?;
                match last_applied {
                    Some(sn) => Ok(sn),
                    None => Ok(self.source.get_start_sn().await?),
                }
            }
            PhaseKind::Catchup(_) | PhaseKind::Downtime => Ok(previous_end_sn
                .expect("catchup and downtime always have a preceding phase's endSN")
                + 1),
        }
    }

    /// Copy's snapshot and Catchup/Downtime's fresh read are mechanically
    /// the same call; the freshness distinction spec.md draws between them
    /// is actually about *when* planning runs relative to `RejectWrites`,
    /// which the orchestrator enforces by constructing Downtime's workload
    /// only after `RejectWrites` has returned — never about this function
    /// behaving differently per phase.
    async fn compute_end_sn(&self) -> Result<i64, PhaseError> {
        Ok(self.source.get_end_sn().await?)
    }

    async fn get_or_add_worker(&self, worker_id: u32, start_sn: i64, end_sn: i64) -> Result<WorkerInput, PhaseError> {
        let lease = self.settings.metadata_lease();
        let start_key = worker_key(fields::START_SEQ_NUM, self.phase, worker_id);
        let end_key = worker_key(fields::END_SEQ_NUM, self.phase, worker_id);
        let status_key = worker_key(fields::CURRENT_STATUS, self.phase, worker_id);
        let started_key = worker_key(fields::START_DATETIME_UTC, self.phase, worker_id);
        let now = Utc::now().to_rfc3339();

        let (start_raw, end_raw, status_raw, started_raw) = self
            .metadata
            .transaction(lease, |txn| {
                let start_raw = txn.get_or_add(&start_key, start_sn.to_string());
                let end_raw = txn.get_or_add(&end_key, end_sn.to_string());
                let status_raw = txn.get_or_add(&status_key, WorkerStatus::InProgress.to_string());
                let started_raw = txn.get_or_add(&started_key, now.clone());
                Ok((start_raw, end_raw, status_raw, started_raw))
            })
            .await?;

        Ok(WorkerInput {
            worker_id,
            phase: Some(self.phase),
            start_sn: parse_long_or_corrupt(&start_raw, &start_key)?,
            end_sn: parse_long_or_corrupt(&end_raw, &end_key)?,
            started_at: parse_timestamp_or_corrupt(&started_raw, &started_key)?,
            status: parse_or_corrupt(&status_raw, &status_key)?,
        })
    }

    async fn record_completion(&self, end_sn: i64, keys_migrated: i64, ended_at: DateTime<Utc>) -> Result<(), PhaseError> {
        let lease = self.settings.metadata_lease();
        let end_dt_key = phase_key(fields::END_DATETIME_UTC, self.phase);
        let last_applied_key = phase_key(fields::LAST_APPLIED_SEQ_NUM, self.phase);
        let keys_migrated_key = phase_key(fields::NO_OF_KEYS_MIGRATED, self.phase);
        let status_key = phase_key(fields::CURRENT_STATUS, self.phase);
        let ended_raw = ended_at.to_rfc3339();

        transact_with_retry(self.metadata, lease, &self.settings.retry_policy, |txn| {
            txn.add_or_update(&end_dt_key, ended_raw.clone(), |_| ended_raw.clone());
            txn.add_or_update(&last_applied_key, end_sn.to_string(), |_| end_sn.to_string());
            txn.add_or_update(&keys_migrated_key, keys_migrated.to_string(), |_| keys_migrated.to_string());
            txn.add_or_update(&status_key, WorkerStatus::Completed.to_string(), |_| {
                WorkerStatus::Completed.to_string()
            });

            // Monotonic per spec.md §5: only ever written at phase completion.
            txn.add_or_update(global::MIGRATION_LAST_APPLIED_SEQ_NUM, end_sn.to_string(), |_| {
                end_sn.to_string()
            });
            txn.add_or_update(
                global::MIGRATION_NO_OF_KEYS_MIGRATED,
                keys_migrated.to_string(),
                |old| {
                    let old: i64 = old.parse().unwrap_or(0);
                    (old + keys_migrated).to_string()
                },
            );
            Ok(())
        })
        .await?;
        Ok(())
    }
}

/// Reconstructs one `(phase, iter)` result from the metadata keyspace,
/// without needing a source client or destination (spec.md §4.4, static
/// `getResult`). Used both as `PhaseWorkload`'s read-only counterpart and by
/// `Orchestrator::get_result` to assemble the full report.
pub async fn read_phase_result(
    metadata: &MemoryMetadataStore,
    lease: Duration,
    phase: PhaseKind,
) -> Result<PhaseResult, MetadataError> {
    let status_key = phase_key(fields::CURRENT_STATUS, phase);
    let start_key = phase_key(fields::START_SEQ_NUM, phase);
    let end_key = phase_key(fields::END_SEQ_NUM, phase);
    let started_key = phase_key(fields::START_DATETIME_UTC, phase);
    let ended_key = phase_key(fields::END_DATETIME_UTC, phase);
    let last_applied_key = phase_key(fields::LAST_APPLIED_SEQ_NUM, phase);
    let keys_migrated_key = phase_key(fields::NO_OF_KEYS_MIGRATED, phase);
    let worker_count_key = phase_key(fields::WORKER_COUNT, phase);

    let (status, start_sn, end_sn, started_at, ended_at, last_applied_sn, keys_migrated, worker_count) = metadata
        .transaction(lease, |txn| {
            let status = parse_or_corrupt(&txn.get(&status_key)?, &status_key)?;
            let start_sn = txn.get_long(&start_key)?;
            let end_sn = txn.get_long(&end_key)?;
            let started_at = parse_timestamp_or_corrupt(&txn.get(&started_key)?, &started_key)?;
            let ended_at = txn
                .get_or_default(&ended_key)
                .map(|raw| parse_timestamp_or_corrupt(&raw, &ended_key))
                .transpose()?;
            let last_applied_sn = txn.get_long_or_default(&last_applied_key)?;
            let keys_migrated = txn.get_long_or_default(&keys_migrated_key)?.unwrap_or(0);
            let worker_count = txn.get_long_or_default(&worker_count_key)?.unwrap_or(0);
            Ok((
                status,
                start_sn,
                end_sn,
                started_at,
                ended_at,
                last_applied_sn,
                keys_migrated,
                worker_count,
            ))
        })
        .await?;

    let mut worker_results = Vec::with_capacity(worker_count as usize);
    for worker_id in 1..=(worker_count as u32) {
        worker_results.push(read_worker_result(metadata, lease, phase, worker_id).await?);
    }

    Ok(PhaseResult {
        phase: phase.phase(),
        iter: phase.iter(),
        status,
        started_at,
        ended_at,
        start_sn,
        end_sn,
        last_applied_sn,
        keys_migrated,
        worker_results,
    })
}

async fn read_worker_result(
    metadata: &MemoryMetadataStore,
    lease: Duration,
    phase: PhaseKind,
    worker_id: u32,
) -> Result<WorkerResult, MetadataError> {
    let status_key = worker_key(fields::CURRENT_STATUS, phase, worker_id);
    let start_key = worker_key(fields::START_SEQ_NUM, phase, worker_id);
    let end_key = worker_key(fields::END_SEQ_NUM, phase, worker_id);
    let started_key = worker_key(fields::START_DATETIME_UTC, phase, worker_id);
    let ended_key = worker_key(fields::END_DATETIME_UTC, phase, worker_id);
    let last_applied_key = worker_key(fields::LAST_APPLIED_SEQ_NUM, phase, worker_id);
    let keys_migrated_key = worker_key(fields::NO_OF_KEYS_MIGRATED, phase, worker_id);

    metadata
        .transaction(lease, |txn| {
            let status = parse_or_corrupt(&txn.get(&status_key)?, &status_key)?;
            let start_sn = txn.get_long(&start_key)?;
            let end_sn = txn.get_long(&end_key)?;
            let started_at = parse_timestamp_or_corrupt(&txn.get(&started_key)?, &started_key)?;
            let ended_at = txn
                .get_or_default(&ended_key)
                .map(|raw| parse_timestamp_or_corrupt(&raw, &ended_key))
                .transpose()?;
            let last_applied_sn = txn.get_long_or_default(&last_applied_key)?;
            let keys_migrated = txn.get_long_or_default(&keys_migrated_key)?.unwrap_or(0);

            Ok(WorkerResult {
                worker_id,
                status,
                started_at,
                ended_at,
                start_sn,
                end_sn,
                last_applied_sn,
                keys_migrated,
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrate_source_client::testing::FakeSourceClient;
    use migrate_types::RetryPolicy;
    use std::time::Duration as StdDuration;

    fn settings() -> MigrationSettings {
        MigrationSettings {
            copy_phase_worker_count: 4,
            catchup_phase_worker_count: 1,
            downtime_threshold: 10,
            worker_batch_size: 64,
            retry_policy: RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 1,
                backoff_cap_ms: 2,
            },
            ..Default::default()
        }
    }

    fn record(sn: i64) -> migrate_source_client::Record {
        migrate_source_client::Record {
            sn,
            key: format!("k{sn}"),
            value: format!("v{sn}").into_bytes(),
        }
    }

    // S2: small static source, startSN=1, endSN=1000, 4 copy workers.
    #[tokio::test]
    async fn copy_phase_partitions_into_four_even_ranges() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 1000);
        for sn in 1..=1000 {
            source.push_record(record(sn));
        }
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();
        let workload = PhaseWorkload::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();

        let result = workload.start_or_resume(None, &cancel).await.unwrap();

        assert_eq!(result.start_sn, 1);
        assert_eq!(result.end_sn, 1000);
        assert_eq!(result.keys_migrated, 1000);
        assert_eq!(result.worker_results.len(), 4);
        for worker in &result.worker_results {
            assert_eq!(worker.keys_migrated, 250);
        }
        assert_eq!(result.worker_results[0].start_sn, 1);
        assert_eq!(result.worker_results[0].end_sn, 250);
        assert_eq!(result.worker_results[3].end_sn, 1000);
    }

    #[tokio::test]
    async fn replanning_after_a_crash_observes_the_existing_plan() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 100);
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();

        let first_plan = {
            let workload = PhaseWorkload::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
            workload.get_or_add_input(None).await.unwrap()
        };
        let second_plan = {
            let workload = PhaseWorkload::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
            workload.get_or_add_input(None).await.unwrap()
        };

        assert_eq!(first_plan.start_sn, second_plan.start_sn);
        assert_eq!(first_plan.end_sn, second_plan.end_sn);
        assert_eq!(first_plan.worker_inputs, second_plan.worker_inputs);
    }

    #[tokio::test]
    async fn read_phase_result_reconstructs_a_completed_phase_from_the_keyspace() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 40);
        for sn in 1..=40 {
            source.push_record(record(sn));
        }
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();
        let workload = PhaseWorkload::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();
        workload.start_or_resume(None, &cancel).await.unwrap();

        let reconstructed = read_phase_result(&metadata, StdDuration::from_secs(1), PhaseKind::Copy)
            .await
            .unwrap();

        assert_eq!(reconstructed.status, WorkerStatus::Completed);
        assert_eq!(reconstructed.keys_migrated, 40);
        assert_eq!(reconstructed.worker_results.len(), 4);
    }

    #[tokio::test]
    async fn catchup_start_sn_follows_the_previous_phases_end_sn() {
        let metadata = MemoryMetadataStore::new();
        let source = FakeSourceClient::new(1, 1000);
        let destination = crate::provider::testing::MemoryStateProvider::new();
        let settings = settings();

        let copy = PhaseWorkload::new(&metadata, &source, &destination, &settings, PhaseKind::Copy);
        let cancel = CancellationToken::new();
        let copy_result = copy.start_or_resume(None, &cancel).await.unwrap();

        source.advance_end_sn(1001);
        let catchup = PhaseWorkload::new(&metadata, &source, &destination, &settings, PhaseKind::Catchup(1));
        let catchup_input = catchup.get_or_add_input(Some(copy_result.end_sn)).await.unwrap();

        assert_eq!(catchup_input.start_sn, copy_result.end_sn + 1);
    }
}
