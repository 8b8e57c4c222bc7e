use async_trait::async_trait;

use crate::error::IngestError;
use crate::types::{BuildContext, Generation, Record};

/// Turns one raw record into at most one document.
///
/// Called concurrently from every ingestion worker, so implementations keep
/// no shared mutable state or synchronize it themselves.
pub trait DocumentBuilder: Send + Sync {
    type Document: Send + 'static;

    /// `Ok(None)` means the record produces no document (e.g. a blank line).
    fn build(&self, record: &Record, ctx: &BuildContext) -> Result<Option<Self::Document>, IngestError>;
}

/// The indexing service documents are submitted to. Must accept concurrent
/// submissions; the ingestion coordinator only bounds concurrency.
#[async_trait]
pub trait IndexSink<D: Send + 'static>: Send + Sync {
    /// Accepts one document and returns the generation it was recorded under.
    async fn submit(&self, document: D) -> Result<Generation, IngestError>;

    /// Makes everything submitted so far durable/visible. Only ever called by
    /// the orchestrating caller after ingestion has drained.
    async fn commit(&self) -> Result<Generation, IngestError>;
}

/// A lazy, finite sequence of raw records.
pub trait RecordSource: Send + Sync {
    fn describe(&self) -> String;

    /// Starts reading from the beginning. Items are yielded in source order.
    ///
    /// Record ids are consecutive from 1 and an `Err` item takes the next id,
    /// so consumers can attribute a read failure to its position. An `Err`
    /// item does not end the sequence. Called from a blocking thread.
    fn records(&self) -> anyhow::Result<Box<dyn Iterator<Item = std::io::Result<Record>> + Send + '_>>;
}
