use migrate_metadata::{MemoryMetadataStore, MetadataError};
use migrate_source_client::SourceClient;
use migrate_types::{fields, global, phase_iteration_key, MigrationPhase, MigrationResult, MigrationSettings, MigrationState, PhaseKind};
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::phase::{read_phase_result, PhaseWorkload};
use crate::provider::DestinationStateProvider;
use crate::util::parse_or_corrupt;

/// Drives the `None -> Copy -> Catchup(1..N) -> Downtime -> Completed` state
/// machine (spec.md §4.5). Holds the single cancellation token shared with
/// whatever signal handler or HTTP endpoint can call [`Self::abort`] while
/// [`Self::run`] is in flight elsewhere.
pub struct Orchestrator<'a> {
    metadata: &'a MemoryMetadataStore,
    source: &'a dyn SourceClient,
    destination: &'a dyn DestinationStateProvider,
    settings: &'a MigrationSettings,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        metadata: &'a MemoryMetadataStore,
        source: &'a dyn SourceClient,
        destination: &'a dyn DestinationStateProvider,
        settings: &'a MigrationSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            metadata,
            source,
            destination,
            settings,
            cancel,
        }
    }

    /// Runs the full migration to completion (or until cancelled). Safe to
    /// call again after a cancelled or failed run: `PhaseWorkload::get_or_add_input`'s
    /// `get_or_add` semantics mean the new driver resumes at whatever
    /// `(phase, iter)` was in progress (spec.md §8, S4/S5).
    pub async fn run(&self) -> Result<MigrationResult, OrchestratorError> {
        let mut phase = self.resume_phase().await?;
        let mut previous_end_sn = self.previous_end_sn(phase).await?;

        loop {
            let workload = PhaseWorkload::new(self.metadata, self.source, self.destination, self.settings, phase);
            let result = workload.start_or_resume(previous_end_sn, &self.cancel).await?;
            tracing::info!(
                phase = %phase,
                start_sn = result.start_sn,
                end_sn = result.end_sn,
                keys_migrated = result.keys_migrated,
                "phase completed",
            );
            previous_end_sn = Some(result.end_sn);

            phase = match phase {
                PhaseKind::Copy => PhaseKind::Catchup(1),
                PhaseKind::Catchup(iter) => {
                    let current_end_sn = self.source.get_end_sn().await?;
                    let delta = current_end_sn - result.end_sn;
                    let next = next_catchup_phase(iter, delta, self.settings.downtime_threshold);
                    if matches!(next, PhaseKind::Downtime) {
                        self.source.reject_writes().await?;
                    }
                    next
                }
                PhaseKind::Downtime => {
                    self.record_migration_completion(result.end_sn).await?;
                    tracing::info!("migration completed, cutover reached");
                    break;
                }
            };
        }

        Ok(self.get_result().await?)
    }

    /// `abort()` (spec.md §4.5): marks the migration `Aborted`, cancels the
    /// driver loop, and best-effort resumes writes on the source so it does
    /// not remain stuck rejecting traffic.
    pub async fn abort(&self) -> Result<(), OrchestratorError> {
        self.metadata
            .transaction(self.settings.metadata_lease(), |txn| {
                Ok(txn.add_or_update(global::MIGRATION_CURRENT_STATUS, MigrationState::Aborted.to_string(), |_| {
                    MigrationState::Aborted.to_string()
                }))
            })
            .await?;
        self.cancel.cancel();

        if let Err(err) = self.source.resume_writes().await {
            tracing::warn!(error = %err, "resume_writes failed during abort; source may still be rejecting writes");
        }
        Ok(())
    }

    /// `isActorCallToBeForwarded()`: true while the migration has not yet
    /// reached `Completed` (spec.md §4.6).
    pub async fn is_actor_call_to_be_forwarded(&self) -> Result<bool, OrchestratorError> {
        let status = self
            .metadata
            .transaction(self.settings.metadata_lease(), |txn| {
                match txn.get_or_default(global::MIGRATION_CURRENT_STATUS) {
                    Some(raw) => parse_or_corrupt(&raw, global::MIGRATION_CURRENT_STATUS),
                    None => Ok(MigrationState::None),
                }
            })
            .await?;
        Ok(status != MigrationState::Completed)
    }

    /// Pure reader (spec.md §4.5 `getResult`): reconstructs a
    /// [`MigrationResult`] from the metadata keyspace. Always succeeds,
    /// reporting the last durable state even for a migration that has not
    /// started or is mid-flight (spec.md §7, "GetResult() always
    /// succeeds").
    pub async fn get_result(&self) -> Result<MigrationResult, MetadataError> {
        let lease = self.settings.metadata_lease();
        let (status, current_phase, start_sn, end_sn, keys_migrated) = self
            .metadata
            .transaction(lease, |txn| {
                let status = match txn.get_or_default(global::MIGRATION_CURRENT_STATUS) {
                    Some(raw) => parse_or_corrupt(&raw, global::MIGRATION_CURRENT_STATUS)?,
                    None => MigrationState::None,
                };
                let current_phase = match txn.get_or_default(global::MIGRATION_CURRENT_PHASE) {
                    Some(raw) => parse_or_corrupt(&raw, global::MIGRATION_CURRENT_PHASE)?,
                    None => MigrationPhase::None,
                };
                let start_sn = txn.get_long_or_default(global::MIGRATION_START_SEQ_NUM)?;
                let end_sn = txn.get_long_or_default(global::MIGRATION_END_SEQ_NUM)?;
                let keys_migrated = txn.get_long_or_default(global::MIGRATION_NO_OF_KEYS_MIGRATED)?.unwrap_or(0);
                Ok((status, current_phase, start_sn, end_sn, keys_migrated))
            })
            .await?;

        let mut phase_results = Vec::new();
        for phase in [MigrationPhase::Copy, MigrationPhase::Catchup, MigrationPhase::Downtime] {
            if phase > current_phase {
                break;
            }

            let iteration_count = self
                .metadata
                .transaction(lease, |txn| txn.get_long_or_default(&phase_iteration_key(phase)))
                .await?;
            let Some(iteration_count) = iteration_count else {
                continue;
            };

            for iter in 1..=iteration_count {
                let kind = match phase {
                    MigrationPhase::Copy => PhaseKind::Copy,
                    MigrationPhase::Catchup => PhaseKind::Catchup(iter as u32),
                    MigrationPhase::Downtime => PhaseKind::Downtime,
                    MigrationPhase::None => unreachable!("loop never visits MigrationPhase::None"),
                };
                phase_results.push(read_phase_result(self.metadata, lease, kind).await?);
            }
        }

        Ok(MigrationResult {
            status,
            current_phase,
            start_sn,
            end_sn,
            keys_migrated,
            phase_results,
        })
    }

    async fn record_migration_completion(&self, end_sn: i64) -> Result<(), OrchestratorError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.metadata
            .transaction(self.settings.metadata_lease(), |txn| {
                // `get_or_add`, not an unconditional set: testable property 4
                // (spec.md §8) requires `MigrationEndSeqNum` be written
                // exactly once across the migration's lifetime.
                txn.get_or_add(global::MIGRATION_END_DATETIME_UTC, now.clone());
                txn.get_or_add(global::MIGRATION_END_SEQ_NUM, end_sn.to_string());
                txn.add_or_update(global::MIGRATION_CURRENT_STATUS, MigrationState::Completed.to_string(), |_| {
                    MigrationState::Completed.to_string()
                });
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Where a fresh driver loop picks up: reads `MigrationCurrentPhase` and
    /// the relevant `PhaseIterationCount` row to find the highest in-flight
    /// `(phase, iter)`, so a restart after failover resumes the same
    /// workload `PhaseWorkload::get_or_add_input` would otherwise re-plan
    /// from scratch (spec.md §8, S4).
    async fn resume_phase(&self) -> Result<PhaseKind, OrchestratorError> {
        let current_phase = self
            .metadata
            .transaction(self.settings.metadata_lease(), |txn| {
                match txn.get_or_default(global::MIGRATION_CURRENT_PHASE) {
                    Some(raw) => parse_or_corrupt(&raw, global::MIGRATION_CURRENT_PHASE),
                    None => Ok(MigrationPhase::None),
                }
            })
            .await?;

        match current_phase {
            MigrationPhase::None => Ok(PhaseKind::Copy),
            MigrationPhase::Copy => Ok(PhaseKind::Copy),
            MigrationPhase::Downtime => Ok(PhaseKind::Downtime),
            MigrationPhase::Catchup => {
                let iter = self
                    .metadata
                    .transaction(self.settings.metadata_lease(), |txn| {
                        txn.get_long_or_default(&phase_iteration_key(MigrationPhase::Catchup))
                    })
                    .await?
                    .unwrap_or(1);
                Ok(PhaseKind::Catchup(iter.max(1) as u32))
            }
        }
    }

    /// The prior phase's `endSN`, needed to resume `Catchup`/`Downtime`
    /// planning after a restart (`Copy` never needs it).
    async fn previous_end_sn(&self, phase: PhaseKind) -> Result<Option<i64>, OrchestratorError> {
        let previous_kind = match phase {
            PhaseKind::Copy => return Ok(None),
            PhaseKind::Catchup(1) => PhaseKind::Copy,
            PhaseKind::Catchup(iter) => PhaseKind::Catchup(iter - 1),
            PhaseKind::Downtime => {
                let last_catchup_iter = self
                    .metadata
                    .transaction(self.settings.metadata_lease(), |txn| {
                        txn.get_long_or_default(&phase_iteration_key(MigrationPhase::Catchup))
                    })
                    .await?
                    .unwrap_or(1)
                    .max(1) as u32;
                PhaseKind::Catchup(last_catchup_iter)
            }
        };

        let end_key = migrate_types::phase_key(fields::END_SEQ_NUM, previous_kind);
        let end_sn = self
            .metadata
            .transaction(self.settings.metadata_lease(), |txn| txn.get_long_or_default(&end_key))
            .await?;
        Ok(end_sn)
    }
}

/// Decides the phase following a completed Catchup iteration (spec.md
/// §4.5): another iteration while the source is still drifting ahead by
/// more than `downtime_threshold`, otherwise cutover to Downtime.
fn next_catchup_phase(iter: u32, delta: i64, downtime_threshold: i64) -> PhaseKind {
    if delta > downtime_threshold {
        PhaseKind::Catchup(iter + 1)
    } else {
        PhaseKind::Downtime
    }
}
