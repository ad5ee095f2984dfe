use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use migrate_core::{DestinationStateProvider, Orchestrator};
use migrate_metadata::MemoryMetadataStore;
use migrate_source_client::SourceClient;
use migrate_types::MigrationSettings;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;

/// Everything the destination-side HTTP surface needs to construct a fresh
/// [`Orchestrator`] per request (spec.md §6: "`GET /migration/result`",
/// "`POST /migration/abort`"). Cheap to clone: every field is an `Arc` or a
/// [`CancellationToken`], itself reference-counted.
#[derive(Clone)]
pub struct DestinationState {
    pub metadata: Arc<MemoryMetadataStore>,
    pub source: Arc<dyn SourceClient>,
    pub destination: Arc<dyn DestinationStateProvider>,
    pub settings: Arc<MigrationSettings>,
    pub cancel: CancellationToken,
}

impl DestinationState {
    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            self.metadata.as_ref(),
            self.source.as_ref(),
            self.destination.as_ref(),
            self.settings.as_ref(),
            self.cancel.clone(),
        )
    }
}

pub fn router(state: DestinationState) -> Router {
    Router::new()
        .route("/migration/result", get(get_migration_result))
        .route("/migration/abort", post(post_migration_abort))
        .with_state(state)
}

async fn get_migration_result(
    State(state): State<DestinationState>,
) -> Result<Json<migrate_types::MigrationResult>, ServerError> {
    let result = state.orchestrator().get_result().await?;
    Ok(Json(result))
}

async fn post_migration_abort(State(state): State<DestinationState>) -> Result<StatusCode, ServerError> {
    state.orchestrator().abort().await?;
    Ok(StatusCode::NO_CONTENT)
}
