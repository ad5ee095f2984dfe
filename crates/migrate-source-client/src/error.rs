use thiserror::Error;

/// Errors surfaced by the source client (spec.md §4.2, §7).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection refused, 5xx, timeout, or "partition not reachable" — all
    /// retried per the configured policy before surfacing.
    #[error("transient source error: {0}")]
    Transient(String),

    /// A 4xx response from the source. Always surfaced, never retried
    /// (spec.md §4.2: "4xx is surfaced").
    #[error("source rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode source response: {0}")]
    Decode(String),

    /// Retries were exhausted without success.
    #[error("source call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl SourceError {
    /// Whether this error belongs to the retriable class (spec.md §4.2).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
