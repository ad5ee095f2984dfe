use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::{MigrationPhase, PhaseKind};
use crate::state::{MigrationState, WorkerStatus};

/// Observed outcome of one worker's run within one phase invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_id: u32,
    pub status: WorkerStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub start_sn: i64,
    pub end_sn: i64,
    pub last_applied_sn: Option<i64>,
    pub keys_migrated: i64,
}

/// Observed outcome of one `(phase, iter)` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: MigrationPhase,
    pub iter: u32,
    pub status: WorkerStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub start_sn: i64,
    pub end_sn: i64,
    pub last_applied_sn: Option<i64>,
    pub keys_migrated: i64,
    pub worker_results: Vec<WorkerResult>,
}

impl PhaseResult {
    pub fn kind(&self) -> PhaseKind {
        match self.phase {
            MigrationPhase::Catchup => PhaseKind::Catchup(self.iter),
            MigrationPhase::Copy => PhaseKind::Copy,
            MigrationPhase::Downtime => PhaseKind::Downtime,
            MigrationPhase::None => PhaseKind::Copy,
        }
    }
}

/// Aggregate migration report, reconstructed from the metadata keyspace by
/// `Orchestrator::get_result` (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub status: MigrationState,
    pub current_phase: MigrationPhase,
    pub start_sn: Option<i64>,
    pub end_sn: Option<i64>,
    pub keys_migrated: i64,
    pub phase_results: Vec<PhaseResult>,
}
