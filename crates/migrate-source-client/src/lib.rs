//! Source Client (spec.md §4.2): HTTP client pool to the legacy service's
//! partition primary. Defines `GetStartSN`, `GetEndSN`, `EnumerateKeys`,
//! `RejectWrites`, `ResumeWrites` with retry/backoff on transient failures.

mod client;
mod error;
mod record;
mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use client::{HttpSourceClient, SourceClient};
pub use error::SourceError;
pub use record::Record;
pub use retry::with_retry;
