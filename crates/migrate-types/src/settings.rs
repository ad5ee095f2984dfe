use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy shared by the source client and metadata lease retries
/// (spec.md §6 "retry policy (max attempts, initial backoff, cap)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            backoff_cap_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

/// Immutable configuration loaded once at orchestrator construction and
/// passed by reference thereafter (spec.md §9 design note: "model settings
/// as an immutable value ... no hidden singletons").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    pub source_service_uri: String,
    pub kvs_actor_service_uri: String,
    pub copy_phase_worker_count: u32,
    pub catchup_phase_worker_count: u32,
    pub downtime_threshold: i64,
    pub worker_batch_size: u32,
    pub retry_policy: RetryPolicy,
    pub operation_timeout_ms: u64,
    pub metadata_lease_ms: u64,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            source_service_uri: String::new(),
            kvs_actor_service_uri: String::new(),
            copy_phase_worker_count: 8,
            catchup_phase_worker_count: 1,
            downtime_threshold: 1024,
            worker_batch_size: 256,
            retry_policy: RetryPolicy::default(),
            operation_timeout_ms: 10_000,
            metadata_lease_ms: 5_000,
        }
    }
}

impl MigrationSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn metadata_lease(&self) -> Duration {
        Duration::from_millis(self.metadata_lease_ms)
    }

    /// Worker count configured for the given phase (spec.md §6:
    /// `CopyPhaseWorkerCount`, `CatchupPhaseWorkerCount`; Downtime reuses the
    /// catchup count since it behaves like a final, zero-delta catchup).
    pub fn worker_count_for(&self, phase: crate::phase::PhaseKind) -> u32 {
        match phase {
            crate::phase::PhaseKind::Copy => self.copy_phase_worker_count,
            crate::phase::PhaseKind::Catchup(_) | crate::phase::PhaseKind::Downtime => {
                self.catchup_phase_worker_count
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseKind;

    #[test]
    fn defaults_match_spec_defaults() {
        let settings = MigrationSettings::default();
        assert_eq!(settings.copy_phase_worker_count, 8);
        assert_eq!(settings.catchup_phase_worker_count, 1);
        assert_eq!(settings.downtime_threshold, 1024);
    }

    #[test]
    fn worker_count_dispatches_on_phase_kind() {
        let mut settings = MigrationSettings::default();
        settings.copy_phase_worker_count = 4;
        settings.catchup_phase_worker_count = 2;

        assert_eq!(settings.worker_count_for(PhaseKind::Copy), 4);
        assert_eq!(settings.worker_count_for(PhaseKind::Catchup(3)), 2);
        assert_eq!(settings.worker_count_for(PhaseKind::Downtime), 2);
    }
}
