//! Core data model for the live state-migration orchestrator: the global
//! migration state machine's vocabulary, the per-phase/per-worker plan and
//! result shapes, and the typed view over the metadata store's raw string
//! values.

mod error;
mod keys;
mod phase;
mod plan;
mod result;
mod settings;
mod state;
mod value;

pub use error::ParseError;
pub use keys::{fields, global, phase_iteration_key, phase_key, worker_key};
pub use phase::{MigrationPhase, PhaseKind};
pub use plan::{partition_range, PhaseInput, WorkerInput};
pub use result::{MigrationResult, PhaseResult, WorkerResult};
pub use settings::{MigrationSettings, RetryPolicy};
pub use state::{MigrationState, WorkerStatus};
pub use value::{parse_int, parse_long, parse_phase, parse_state, parse_timestamp, StoredValue};
