//! A scriptable fake of the legacy KVS controller's HTTP surface (spec.md
//! §6), backing `migrate-source-client`'s `testing::FakeSourceClient` with
//! the same wire shapes `HttpSourceClient` speaks. Used by this workspace's
//! own integration tests; not part of the production destination surface.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::Router;
use migrate_source_client::testing::FakeSourceClient;
use migrate_source_client::SourceClient;
use serde::Deserialize;

#[derive(Clone)]
pub struct FakeSourceState {
    pub source: Arc<FakeSourceClient>,
}

pub fn router(state: FakeSourceState) -> Router {
    Router::new()
        .route("/GetStartSN", get(get_start_sn))
        .route("/GetEndSN", get(get_end_sn))
        .route("/EnumerateKeys", get(enumerate_keys))
        .route("/RejectWrites", put(reject_writes))
        .route("/ResumeWrites", put(resume_writes))
        .with_state(state)
}

async fn get_start_sn(State(state): State<FakeSourceState>) -> String {
    state.source.get_start_sn().await.unwrap_or_default().to_string()
}

async fn get_end_sn(State(state): State<FakeSourceState>) -> String {
    state.source.get_end_sn().await.unwrap_or_default().to_string()
}

#[derive(Deserialize)]
struct RangeQuery {
    from: i64,
    to: i64,
}

async fn enumerate_keys(State(state): State<FakeSourceState>, Query(range): Query<RangeQuery>) -> String {
    use futures::StreamExt;

    let Ok(mut stream) = state.source.enumerate_keys(range.from, range.to).await else {
        return String::new();
    };

    let mut body = String::new();
    while let Some(Ok(record)) = stream.next().await {
        body.push_str(&serde_json::to_string(&record).expect("Record always serializes"));
        body.push('\n');
    }
    body
}

async fn reject_writes(State(state): State<FakeSourceState>) -> StatusCode {
    let _ = state.source.reject_writes().await;
    StatusCode::NO_CONTENT
}

async fn resume_writes(State(state): State<FakeSourceState>) -> StatusCode {
    let _ = state.source.resume_writes().await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use migrate_source_client::Record;
    use tower::ServiceExt;

    #[tokio::test]
    async fn enumerate_keys_round_trips_ndjson_over_http() {
        let fake = Arc::new(FakeSourceClient::new(1, 10));
        fake.push_record(Record {
            sn: 1,
            key: "k1".into(),
            value: b"v1".to_vec(),
        });
        let app = router(FakeSourceState { source: fake });

        let response = app
            .oneshot(
                Request::get("/EnumerateKeys?from=1&to=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        let records: Vec<Record> = body.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "k1");
    }
}
