use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors surfaced by the destination-side HTTP handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Orchestrator(#[from] migrate_core::OrchestratorError),

    #[error(transparent)]
    Metadata(#[from] migrate_metadata::MetadataError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
