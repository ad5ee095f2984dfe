use migrate_metadata::MetadataError;
use migrate_source_client::SourceError;
use thiserror::Error;

/// The destination rejected a record outright (spec.md §7, "ApplyError from
/// worker"). Always fatal: the record cannot be retried away.
#[derive(Debug, Error)]
#[error("destination rejected record at sn {sn}: {reason}")]
pub struct ApplyError {
    pub sn: i64,
    pub reason: String,
}

/// Errors surfaced by a single [`crate::worker::MigrationWorker`] run.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// Propagated unchanged, per spec.md §7 ("Cancelled — propagated
    /// unchanged").
    #[error("worker cancelled")]
    Cancelled,
}

/// Errors surfaced by a single [`crate::phase::PhaseWorkload`] invocation.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("worker {worker_id} failed")]
    Worker {
        worker_id: u32,
        #[source]
        source: WorkerError,
    },

    #[error("phase cancelled")]
    Cancelled,
}

/// Errors surfaced by [`crate::orchestrator::Orchestrator::run`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}
