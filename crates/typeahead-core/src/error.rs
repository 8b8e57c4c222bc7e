use thiserror::Error;

/// Configuration-level failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Query-path failures. These are surfaced to the caller as-is; a lookup
/// never returns partial results alongside one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SuggestError {
    #[error("suggester \"{name}\" was not yet built; valid suggest names: [{}]", .valid.join(", "))]
    UnknownSuggester { name: String, valid: Vec<String> },

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Payload of \"{key}\" is not valid UTF-8: {reason}")]
    DataIntegrity { key: String, reason: String },
}

pub type SuggestResult<T> = std::result::Result<T, SuggestError>;

/// Per-record ingestion failures. Each one is attached to the outcome of the
/// record that caused it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Failed to build document: {0}")]
    Build(String),

    #[error("Sink rejected document: {0}")]
    Submission(String),

    #[error("Failed to read record source: {0}")]
    Source(String),

    #[error("Ingestion worker failed: {0}")]
    Worker(String),
}
