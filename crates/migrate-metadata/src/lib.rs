//! Metadata Store Adapter (spec.md §4.1): a thin typed facade over the
//! external transactional dictionary the migration state machine uses for
//! all of its bookkeeping. The real deployment target is an external
//! replicated, serializable key/value store; [`MemoryMetadataStore`] is the
//! in-process stand-in used by a single-partition binary and by tests.

mod error;
mod store;

pub use error::MetadataError;
pub use store::{MemoryMetadataStore, MetadataTxn};
