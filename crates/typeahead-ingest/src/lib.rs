//! typeahead-ingest
//!
//! Bounded-concurrency bulk ingestion: record sources, the JSON-lines
//! document builder, the in-process completion sink, and the coordinator
//! that fans records out to a worker pool and tallies their outcomes.
pub mod builder;
pub mod coordinator;
pub mod sink;
pub mod source;

pub use builder::JsonLineBuilder;
pub use coordinator::{BulkIngestionCoordinator, IngestReport, SubmissionOutcome, TaskState};
pub use sink::CompletionSink;
pub use source::{LineSource, MemorySource};
