//! Destination-side HTTP surface (spec.md §6: `GET /migration/result`,
//! `POST /migration/abort`) plus, behind `test-support`, a scriptable fake
//! of the source-side KVS controller used by this workspace's integration
//! tests.

mod destination;
mod error;

#[cfg(any(test, feature = "test-support"))]
pub mod kvs_fake;

pub use destination::{router as destination_router, DestinationState};
pub use error::ServerError;
