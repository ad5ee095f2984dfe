use std::sync::Arc;

use async_trait::async_trait;
use migrate_metadata::MemoryMetadataStore;
use migrate_types::{global, MigrationState};

use crate::error::ForwardError;

/// `isActorCallToBeForwarded()` (spec.md §4.6): true while the migration has
/// not yet reached `Completed`. Kept independent of `migrate-core` so the
/// request hot path only pulls in a metadata read, not the orchestrator
/// state machine.
#[async_trait]
pub trait ForwardingPredicate: Send + Sync {
    async fn is_actor_call_to_be_forwarded(&self) -> Result<bool, ForwardError>;
}

/// Reads `MigrationCurrentStatus` straight out of the metadata store on
/// every call, per spec.md §4.6 ("queried per-request ... may flip ... at
/// the moment Downtime completes"). Holds its own `Arc` handle, not a
/// borrow, so it can live behind the `Arc<dyn ForwardingPredicate>` axum
/// middleware state requires.
pub struct MetadataForwardingPredicate {
    metadata: Arc<MemoryMetadataStore>,
    lease: std::time::Duration,
}

impl MetadataForwardingPredicate {
    pub fn new(metadata: Arc<MemoryMetadataStore>, lease: std::time::Duration) -> Self {
        Self { metadata, lease }
    }
}

#[async_trait]
impl ForwardingPredicate for MetadataForwardingPredicate {
    async fn is_actor_call_to_be_forwarded(&self) -> Result<bool, ForwardError> {
        let status = self
            .metadata
            .transaction(self.lease, |txn| match txn.get_or_default(global::MIGRATION_CURRENT_STATUS) {
                Some(raw) => migrate_types::parse_state(&raw).map_err(|source| migrate_metadata::MetadataError::Corrupt {
                    key: global::MIGRATION_CURRENT_STATUS.to_string(),
                    source,
                }),
                None => Ok(MigrationState::None),
            })
            .await?;
        Ok(status != MigrationState::Completed)
    }
}
