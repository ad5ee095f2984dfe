//! Migration Worker, Phase Workload, and Orchestrator (spec.md §4.3–§4.5):
//! the state machine that drives a keyspace migration from a legacy KV
//! store to its replacement through `Copy -> Catchup(1..N) -> Downtime ->
//! Completed`, with persistent, resumable bookkeeping in the metadata
//! store and no in-process state any component depends on surviving a
//! restart.

mod error;
mod orchestrator;
mod phase;
mod provider;
mod retry;
mod util;
mod worker;

pub use error::{ApplyError, OrchestratorError, PhaseError, WorkerError};
pub use orchestrator::Orchestrator;
pub use phase::{read_phase_result, PhaseWorkload};
pub use provider::DestinationStateProvider;
#[cfg(any(test, feature = "test-support"))]
pub use provider::testing;
pub use worker::MigrationWorker;
