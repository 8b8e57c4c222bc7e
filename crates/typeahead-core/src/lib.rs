//! typeahead-core
//!
//! Shared data model, error types and collaborator traits for the suggestion
//! lookup path (`typeahead-text`) and the bulk ingestion path
//! (`typeahead-ingest`).
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{IngestError, SuggestError, SuggestResult};
