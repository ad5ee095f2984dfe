//! A scriptable, in-process [`SourceClient`] used by this crate's own tests
//! and by `migrate-core`'s orchestrator/worker/phase tests to drive the
//! end-to-end scenarios in spec.md §8 without a live HTTP source.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use crate::client::SourceClient;
use crate::error::SourceError;
use crate::record::Record;

struct Inner {
    start_sn: i64,
    end_sn: i64,
    records: Vec<Record>,
    writes_rejected: bool,
}

/// An in-memory source whose `end_sn` can be advanced between calls, to
/// script the "live source" convergence scenarios (spec.md §8, S3).
pub struct FakeSourceClient {
    inner: Mutex<Inner>,
}

impl FakeSourceClient {
    pub fn new(start_sn: i64, end_sn: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                start_sn,
                end_sn,
                records: Vec::new(),
                writes_rejected: false,
            }),
        }
    }

    /// Registers a record so `enumerate_keys` can return it. Does not
    /// automatically advance `end_sn`; call [`Self::advance_end_sn`]
    /// separately to script catchup convergence.
    pub fn push_record(&self, record: Record) {
        self.inner.lock().unwrap().records.push(record);
    }

    pub fn advance_end_sn(&self, new_end_sn: i64) {
        let mut inner = self.inner.lock().unwrap();
        assert!(new_end_sn >= inner.end_sn, "end_sn must not regress");
        inner.end_sn = new_end_sn;
    }

    pub fn writes_rejected(&self) -> bool {
        self.inner.lock().unwrap().writes_rejected
    }
}

#[async_trait]
impl SourceClient for FakeSourceClient {
    async fn get_start_sn(&self) -> Result<i64, SourceError> {
        Ok(self.inner.lock().unwrap().start_sn)
    }

    async fn get_end_sn(&self) -> Result<i64, SourceError> {
        Ok(self.inner.lock().unwrap().end_sn)
    }

    async fn enumerate_keys(
        &self,
        from: i64,
        to: i64,
    ) -> Result<BoxStream<'static, Result<Record, SourceError>>, SourceError> {
        let mut matching: Vec<Record> = self
            .inner
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.sn >= from && r.sn <= to)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.sn);
        Ok(futures::stream::iter(matching.into_iter().map(Ok)).boxed())
    }

    async fn reject_writes(&self) -> Result<(), SourceError> {
        self.inner.lock().unwrap().writes_rejected = true;
        Ok(())
    }

    async fn resume_writes(&self) -> Result<(), SourceError> {
        self.inner.lock().unwrap().writes_rejected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enumerate_keys_returns_matching_records_in_sn_order() {
        let fake = FakeSourceClient::new(1, 100);
        fake.push_record(Record {
            sn: 5,
            key: "b".into(),
            value: b"v2".to_vec(),
        });
        fake.push_record(Record {
            sn: 2,
            key: "a".into(),
            value: b"v1".to_vec(),
        });

        let mut stream = fake.enumerate_keys(1, 10).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.sn, 2);
        assert_eq!(second.sn, 5);
    }

    #[tokio::test]
    async fn reject_then_resume_writes_toggles_flag() {
        let fake = FakeSourceClient::new(1, 0);
        assert!(!fake.writes_rejected());
        fake.reject_writes().await.unwrap();
        assert!(fake.writes_rejected());
        fake.resume_writes().await.unwrap();
        assert!(!fake.writes_rejected());
    }
}
