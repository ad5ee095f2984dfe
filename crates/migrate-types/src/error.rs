use thiserror::Error;

/// A stored metadata value failed to parse into its expected typed form.
/// Per spec.md §4.1 this is always fatal: corruption of the persistent
/// keyspace is not a condition the migration can retry its way out of.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid {type_name} value: {value:?}")]
    InvalidEnum {
        type_name: &'static str,
        value: String,
    },

    #[error("invalid integer value: {value:?}")]
    InvalidInt { value: String },

    #[error("invalid UTC timestamp value: {value:?}")]
    InvalidTimestamp { value: String },
}
