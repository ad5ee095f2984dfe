use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use migrate_types::RetryPolicy;
use reqwest::StatusCode;

use crate::error::SourceError;
use crate::record::{decode_ndjson_line, Record};
use crate::retry::with_retry;

/// The narrow interface the migration core depends on for everything it
/// needs from the legacy KVS partition primary (spec.md §2.2, §4.2). Kept as
/// a trait so `migrate-core` never depends on `reqwest` directly and tests
/// can substitute a scriptable fake.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn get_start_sn(&self) -> Result<i64, SourceError>;
    async fn get_end_sn(&self) -> Result<i64, SourceError>;

    /// Streams `[from, to]` in ascending SN order. Returns an empty stream
    /// if `from > to`.
    async fn enumerate_keys(
        &self,
        from: i64,
        to: i64,
    ) -> Result<BoxStream<'static, Result<Record, SourceError>>, SourceError>;

    async fn reject_writes(&self) -> Result<(), SourceError>;
    async fn resume_writes(&self) -> Result<(), SourceError>;
}

/// HTTP client pool to the legacy service's partition primary (spec.md
/// §4.2). Retries transient failures with exponential backoff and jitter;
/// 4xx responses are surfaced unchanged.
pub struct HttpSourceClient {
    http: reqwest::Client,
    base_uri: String,
    retry_policy: RetryPolicy,
    page_size: i64,
}

impl HttpSourceClient {
    /// Builds on top of an already-configured `reqwest::Client` so the
    /// process can share one connection pool between this client and the
    /// forwarding dispatcher rather than opening a second one (spec.md §6).
    pub fn new(base_uri: impl Into<String>, retry_policy: RetryPolicy, http: reqwest::Client) -> Self {
        Self {
            http,
            base_uri: base_uri.into(),
            retry_policy,
            page_size: 1000,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_uri.trim_end_matches('/'), path)
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(classify_transport_error)?;

        classify_response(&response)?;
        response.text().await.map_err(classify_transport_error)
    }

    async fn put(&self, path: &str) -> Result<(), SourceError> {
        let response = self
            .http
            .put(self.url(path))
            .send()
            .await
            .map_err(classify_transport_error)?;
        classify_response(&response)
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn get_start_sn(&self) -> Result<i64, SourceError> {
        with_retry(&self.retry_policy, || async {
            let body = self.get_text("GetStartSN", &[]).await?;
            body.trim()
                .parse::<i64>()
                .map_err(|e| SourceError::Decode(e.to_string()))
        })
        .await
    }

    async fn get_end_sn(&self) -> Result<i64, SourceError> {
        with_retry(&self.retry_policy, || async {
            let body = self.get_text("GetEndSN", &[]).await?;
            body.trim()
                .parse::<i64>()
                .map_err(|e| SourceError::Decode(e.to_string()))
        })
        .await
    }

    async fn enumerate_keys(
        &self,
        from: i64,
        to: i64,
    ) -> Result<BoxStream<'static, Result<Record, SourceError>>, SourceError> {
        if from > to {
            return Ok(futures::stream::empty().boxed());
        }

        // Owned clones so the returned stream is `'static` without
        // borrowing `self`: the stream outlives this call, paginating
        // `EnumerateKeys` on demand and decoding each page's chunked body as
        // it arrives rather than buffering a page (let alone the whole
        // range) into memory first.
        let http = self.http.clone();
        let base_uri = self.base_uri.clone();
        let retry_policy = self.retry_policy.clone();
        let page_size = self.page_size;

        let stream = async_stream::try_stream! {
            let mut cursor = from;
            while cursor <= to {
                let upper = (cursor + page_size - 1).min(to);
                let response = with_retry(&retry_policy, || async {
                    let response = http
                        .get(format!("{}/EnumerateKeys", base_uri.trim_end_matches('/')))
                        .query(&[("from", cursor.to_string()), ("to", upper.to_string())])
                        .send()
                        .await
                        .map_err(classify_transport_error)?;
                    classify_response(&response)?;
                    Ok(response)
                })
                .await?;

                let mut body = response.bytes_stream();
                let mut buf = String::new();
                let mut last_sn = None;

                while let Some(chunk) = body.next().await {
                    let chunk = chunk.map_err(classify_transport_error)?;
                    buf.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(at) = buf.find('\n') {
                        let line = buf[..at].trim().to_string();
                        buf.drain(..=at);
                        if line.is_empty() {
                            continue;
                        }
                        let record = decode_ndjson_line(&line)?;
                        last_sn = Some(record.sn);
                        yield record;
                    }
                }
                let trailing = buf.trim();
                if !trailing.is_empty() {
                    let record = decode_ndjson_line(trailing)?;
                    last_sn = Some(record.sn);
                    yield record;
                }

                match last_sn {
                    Some(sn) => cursor = sn + 1,
                    None => break,
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn reject_writes(&self) -> Result<(), SourceError> {
        with_retry(&self.retry_policy, || self.put("RejectWrites")).await
    }

    async fn resume_writes(&self) -> Result<(), SourceError> {
        with_retry(&self.retry_policy, || self.put("ResumeWrites")).await
    }
}

fn classify_transport_error(err: reqwest::Error) -> SourceError {
    // Connection-refused, timeout, and "partition not reachable" all surface
    // as a `reqwest::Error` at the transport layer, before any HTTP status
    // is available; all are transient per spec.md §4.2.
    SourceError::Transient(err.to_string())
}

fn classify_response(response: &reqwest::Response) -> Result<(), SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return Err(SourceError::Transient(format!("status {status}")));
    }
    Err(SourceError::Rejected {
        status: status.as_u16(),
        body: String::new(),
    })
}
