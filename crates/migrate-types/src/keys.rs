//! Composite metadata key builders (spec.md §3).
//!
//! Global keys are unprefixed constants. Per-phase and per-worker keys are
//! built as `Phase_<field>_<phase>_<iter>[_<workerId>]`.

use crate::phase::{MigrationPhase, PhaseKind};

pub mod global {
    pub const MIGRATION_START_DATETIME_UTC: &str = "MigrationStartDateTimeUTC";
    pub const MIGRATION_END_DATETIME_UTC: &str = "MigrationEndDateTimeUTC";
    pub const MIGRATION_CURRENT_STATUS: &str = "MigrationCurrentStatus";
    pub const MIGRATION_CURRENT_PHASE: &str = "MigrationCurrentPhase";
    pub const MIGRATION_START_SEQ_NUM: &str = "MigrationStartSeqNum";
    pub const MIGRATION_END_SEQ_NUM: &str = "MigrationEndSeqNum";
    pub const MIGRATION_LAST_APPLIED_SEQ_NUM: &str = "MigrationLastAppliedSeqNum";
    pub const MIGRATION_NO_OF_KEYS_MIGRATED: &str = "MigrationNoOfKeysMigrated";
}

fn phase_prefix(field: &str, phase: PhaseKind) -> String {
    format!("Phase_{field}_{}_{}", phase.phase(), phase.iter())
}

/// Per-phase key for `field` under the given `(phase, iter)`.
pub fn phase_key(field: &str, phase: PhaseKind) -> String {
    phase_prefix(field, phase)
}

/// Per-worker key for `field` under the given `(phase, iter, worker_id)`.
pub fn worker_key(field: &str, phase: PhaseKind, worker_id: u32) -> String {
    format!("{}_{worker_id}", phase_prefix(field, phase))
}

/// `PhaseIterationCount` is tracked once per [`MigrationPhase`], not once per
/// `(phase, iter)` pair: it is the count of iterations a phase kind has run,
/// read back by `get_result` to know how many `(phase, iter)` rows exist for
/// a given phase. Using the ordinary `phase_key` here (which bakes `iter`
/// into the key name) would make the stored value redundant with the key
/// itself and give `get_result` no way to discover the iteration count
/// without guessing upper bounds.
pub fn phase_iteration_key(phase: MigrationPhase) -> String {
    format!("Phase_{}_{phase}", fields::ITERATION_COUNT)
}

pub mod fields {
    pub const CURRENT_STATUS: &str = "CurrentStatus";
    pub const START_DATETIME_UTC: &str = "StartDateTimeUTC";
    pub const END_DATETIME_UTC: &str = "EndDateTimeUTC";
    pub const START_SEQ_NUM: &str = "StartSeqNum";
    pub const END_SEQ_NUM: &str = "EndSeqNum";
    pub const LAST_APPLIED_SEQ_NUM: &str = "LastAppliedSeqNum";
    pub const NO_OF_KEYS_MIGRATED: &str = "NoOfKeysMigrated";
    pub const WORKER_COUNT: &str = "WorkerCount";
    pub const ITERATION_COUNT: &str = "IterationCount";
}
