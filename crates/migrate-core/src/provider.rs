use async_trait::async_trait;
use migrate_source_client::Record;

use crate::error::ApplyError;

/// The seam the migration worker applies records through (spec.md §9,
/// "break the orchestrator/state-provider cycle"). `migrate-core` never
/// depends on the concrete replicated-collection store; callers supply
/// whatever implementation fronts it. No schema translation happens here —
/// that is this trait's job to provide, not this crate's to assume.
#[async_trait]
pub trait DestinationStateProvider: Send + Sync {
    /// Applies every record in `records` as a single destination-side
    /// transaction (spec.md §4.3 step 4a). Implementations that cannot
    /// offer atomicity across the batch should prefer failing the whole
    /// batch over partially applying it, since a partial apply followed by
    /// an error would be re-applied in full on retry.
    async fn apply_batch(&self, records: &[Record]) -> Result<(), ApplyError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{ApplyError, DestinationStateProvider, Record};
    use async_trait::async_trait;

    /// A scriptable in-memory destination used by this crate's own tests and
    /// the end-to-end scenarios in spec.md §8. Can be told to reject a
    /// specific `sn` to exercise the poison-record failure path.
    #[derive(Default)]
    pub struct MemoryStateProvider {
        applied: Mutex<HashMap<String, Vec<u8>>>,
        reject_sn: Mutex<Option<i64>>,
    }

    impl MemoryStateProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reject_sn(&self, sn: i64) {
            *self.reject_sn.lock().unwrap() = Some(sn);
        }

        pub fn applied_count(&self) -> usize {
            self.applied.lock().unwrap().len()
        }

        pub fn get(&self, key: &str) -> Option<Vec<u8>> {
            self.applied.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl DestinationStateProvider for MemoryStateProvider {
        async fn apply_batch(&self, records: &[Record]) -> Result<(), ApplyError> {
            if let Some(poison) = *self.reject_sn.lock().unwrap() {
                if let Some(record) = records.iter().find(|r| r.sn == poison) {
                    return Err(ApplyError {
                        sn: record.sn,
                        reason: "scripted rejection".to_string(),
                    });
                }
            }

            let mut applied = self.applied.lock().unwrap();
            for record in records {
                applied.insert(record.key.clone(), record.value.clone());
            }
            Ok(())
        }
    }
}
