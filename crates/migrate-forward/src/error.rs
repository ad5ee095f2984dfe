use thiserror::Error;

/// Errors surfaced by the forwarding predicate and the actor-call router.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Metadata(#[from] migrate_metadata::MetadataError),

    #[error("forwarding request to source failed: {0}")]
    Upstream(#[from] reqwest::Error),
}
