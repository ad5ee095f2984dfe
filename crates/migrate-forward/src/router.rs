use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::predicate::ForwardingPredicate;

/// Shared state for the forwarding middleware: the predicate that decides
/// whether to forward, and where to forward to.
pub struct ActorCallRouter {
    predicate: Arc<dyn ForwardingPredicate>,
    http: reqwest::Client,
    source_base_uri: String,
}

impl ActorCallRouter {
    pub fn new(predicate: Arc<dyn ForwardingPredicate>, http: reqwest::Client, source_base_uri: impl Into<String>) -> Self {
        Self {
            predicate,
            http,
            source_base_uri: source_base_uri.into(),
        }
    }

    fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
        format!("{}{path_and_query}", self.source_base_uri.trim_end_matches('/'))
    }
}

/// Wraps the destination's RPC handler (spec.md §4.6): forwards every
/// incoming actor call to the source's partition primary while the
/// migration is active, and lets it fall through to the local handler once
/// `isActorCallToBeForwarded()` returns false.
pub async fn forward_or_handle(State(router): State<Arc<ActorCallRouter>>, request: Request, next: Next) -> Response {
    match router.predicate.is_actor_call_to_be_forwarded().await {
        Ok(true) => forward(&router, request).await,
        Ok(false) => next.run(request).await,
        Err(err) => {
            tracing::error!(error = %err, "forwarding predicate failed, falling back to local handler");
            next.run(request).await
        }
    }
}

async fn forward(router: &ActorCallRouter, request: Request) -> Response {
    let method = request.method().clone();
    let url = router.target_url(request.uri());
    let headers = request.headers().clone();

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to buffer request body for forwarding");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let mut outgoing = router
        .http
        .request(method.clone(), &url)
        .body(body.to_vec());
    outgoing = apply_forwardable_headers(outgoing, &headers);

    tracing::debug!(%method, %url, "forwarding actor call to source");
    match outgoing.send().await {
        Ok(upstream) => upstream_into_response(upstream).await,
        Err(err) => {
            tracing::warn!(error = %err, %url, "forwarding to source failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

fn apply_forwardable_headers(mut builder: reqwest::RequestBuilder, headers: &HeaderMap) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        if name == axum::http::header::HOST {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    builder
}

async fn upstream_into_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let body = upstream.bytes().await.unwrap_or_default();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in &headers {
        response.headers_mut().insert(name, value.clone());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForwardError;
    use async_trait::async_trait;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    struct FixedPredicate(bool);

    #[async_trait]
    impl ForwardingPredicate for FixedPredicate {
        async fn is_actor_call_to_be_forwarded(&self) -> Result<bool, ForwardError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn local_handler_is_not_bypassed_when_not_forwarding() {
        let router = Arc::new(ActorCallRouter::new(
            Arc::new(FixedPredicate(false)),
            reqwest::Client::new(),
            "http://127.0.0.1:1",
        ));
        let hit = Arc::new(AtomicBool::new(false));
        let hit_clone = hit.clone();

        let app = Router::new()
            .route(
                "/actor/call",
                get(move || {
                    let hit = hit_clone.clone();
                    async move {
                        hit.store(true, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(router, forward_or_handle));

        let response = app
            .oneshot(Request::builder().uri("/actor/call").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(hit.load(Ordering::SeqCst));
    }
}
