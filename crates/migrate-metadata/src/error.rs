use migrate_types::ParseError;
use thiserror::Error;

/// Errors surfaced by the metadata store adapter (spec.md §4.1, §7).
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata key not found: {0}")]
    NotFound(String),

    /// A stored value failed to parse into its typed form. Fatal per
    /// spec.md §7 ("Parse/Corruption ... fatal").
    #[error("metadata corruption at key {key:?}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: ParseError,
    },

    /// The transaction's lease expired before it committed (spec.md §5,
    /// "every transactional operation ... carries a per-operation lease").
    #[error("metadata transaction lease expired")]
    LeaseExpired,
}
