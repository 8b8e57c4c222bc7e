//! Bulk ingestion over a bounded worker pool.
//!
//! Every record is dispatched as its own Tokio task up front; a semaphore with
//! `workers` permits bounds how many are building or submitting at once. The
//! coordinator then drains the task handles in completion order and tallies
//! one [`SubmissionOutcome`] per record. A failing or panicking task only
//! affects its own record, and so does a record the source could not read.
//! Committing the sink is left to the caller.
//!
//! The source is read on a blocking thread and handed to the dispatch loop
//! through a bounded channel, so file IO never runs on a runtime worker.
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use typeahead_core::config::default_workers;
use typeahead_core::traits::{DocumentBuilder, IndexSink, RecordSource};
use typeahead_core::types::{BuildContext, Generation, Record};
use typeahead_core::IngestError;

/// Records read ahead of the dispatch loop.
const READ_AHEAD: usize = 1024;

/// Lifecycle of one ingestion task.
///
/// `Queued -> Building -> Submitting -> Succeeded | Failed`, plus the early
/// exits `Building -> Failed | Skipped` and `Queued -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Building,
    Submitting,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled)
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Building | Cancelled | Failed)
                | (Building, Submitting | Failed | Skipped)
                | (Submitting, Succeeded | Failed)
        )
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Succeeded(Generation),
    /// The builder produced no document for the record.
    Skipped,
    Failed(IngestError),
    /// Cancellation arrived before the record started building.
    Cancelled,
}

impl SubmissionOutcome {
    fn state(&self) -> TaskState {
        match self {
            Self::Succeeded(_) => TaskState::Succeeded,
            Self::Skipped => TaskState::Skipped,
            Self::Failed(_) => TaskState::Failed,
            Self::Cancelled => TaskState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
    /// `(record id, cause)`, sorted by record id.
    pub failures: Vec<(u64, IngestError)>,
    /// Dispatch stopped before the source was exhausted (cancellation, or the
    /// reader died); records past that point were never read.
    pub stopped_early: bool,
}

impl IngestReport {
    fn record(&mut self, id: u64, outcome: SubmissionOutcome) {
        self.processed += 1;
        match outcome {
            SubmissionOutcome::Succeeded(generation) => {
                self.succeeded += 1;
                tracing::trace!(record = id, generation, "record indexed");
            }
            SubmissionOutcome::Skipped => self.skipped += 1,
            SubmissionOutcome::Cancelled => self.cancelled += 1,
            SubmissionOutcome::Failed(cause) => {
                self.failed += 1;
                tracing::warn!(record = id, error = %cause, "record failed");
                self.failures.push((id, cause));
            }
        }
    }

    /// Nothing failed and nothing was cut short.
    pub fn is_clean(&self) -> bool { self.failed == 0 && self.cancelled == 0 && !self.stopped_early }
}

struct IngestionTask {
    record: u64,
    state: TaskState,
}

impl IngestionTask {
    fn new(record: u64) -> Self { Self { record, state: TaskState::Queued } }

    fn advance(&mut self, next: TaskState) {
        debug_assert!(self.state.can_advance_to(next), "{:?} -> {:?}", self.state, next);
        tracing::trace!(record = self.record, from = ?self.state, to = ?next, "task state");
        self.state = next;
    }

    fn finish(mut self, outcome: SubmissionOutcome) -> SubmissionOutcome {
        self.advance(outcome.state());
        outcome
    }
}

pub struct BulkIngestionCoordinator {
    workers: usize,
    cancel: CancellationToken,
}

impl Default for BulkIngestionCoordinator {
    fn default() -> Self { Self::new(default_workers()) }
}

impl BulkIngestionCoordinator {
    pub fn new(workers: usize) -> Self { Self { workers: workers.max(1), cancel: CancellationToken::new() } }

    pub fn workers(&self) -> usize { self.workers }

    /// Cancelling stops dispatch; tasks already building or submitting finish
    /// normally and queued ones end as [`SubmissionOutcome::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    pub async fn ingest<R, B, S>(
        &self,
        source: Arc<R>,
        builder: Arc<B>,
        sink: Arc<S>,
        ctx: BuildContext,
    ) -> Result<IngestReport, IngestError>
    where
        R: RecordSource + ?Sized + 'static,
        B: DocumentBuilder + 'static,
        S: IndexSink<B::Document> + 'static,
    {
        self.ingest_observed(source, builder, sink, ctx, |_, _| {}).await
    }

    /// Like [`ingest`](Self::ingest), calling `on_outcome` as each record
    /// resolves (in completion order).
    pub async fn ingest_observed<R, B, S, F>(
        &self,
        source: Arc<R>,
        builder: Arc<B>,
        sink: Arc<S>,
        ctx: BuildContext,
        mut on_outcome: F,
    ) -> Result<IngestReport, IngestError>
    where
        R: RecordSource + ?Sized + 'static,
        B: DocumentBuilder + 'static,
        S: IndexSink<B::Document> + 'static,
        F: FnMut(u64, &SubmissionOutcome),
    {
        let started = Instant::now();
        let described = source.describe();
        let (mut records, reader) = spawn_reader(source, self.cancel.clone()).await?;
        tracing::info!(source = %described, suggester = %ctx.index_name, workers = self.workers, "ingestion started");

        let permits = Arc::new(Semaphore::new(self.workers));
        let ctx = Arc::new(ctx);
        let mut report = IngestReport::default();
        let mut pending = FuturesUnordered::new();
        let mut last_id = 0u64;

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::warn!(dispatched = pending.len(), "ingestion cancelled, no further records dispatched");
                    report.stopped_early = !matches!(records.try_recv(), Err(mpsc::error::TryRecvError::Disconnected));
                    break;
                }
                item = records.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    last_id += 1;
                    let outcome = SubmissionOutcome::Failed(IngestError::Source(e.to_string()));
                    on_outcome(last_id, &outcome);
                    report.record(last_id, outcome);
                    continue;
                }
            };
            last_id = record.id;
            let id = record.id;
            let handle = tokio::spawn(run_task(
                record,
                Arc::clone(&builder),
                Arc::clone(&sink),
                Arc::clone(&ctx),
                Arc::clone(&permits),
                self.cancel.clone(),
            ));
            pending.push(async move { (id, handle.await) });
        }
        drop(records);
        if let Err(e) = reader.await {
            tracing::error!(error = %e, last_record = last_id, "record reader died, remaining records were not read");
            report.stopped_early = true;
        }
        tracing::debug!(dispatched = pending.len(), "all records dispatched, draining");

        while let Some((id, joined)) = pending.next().await {
            let outcome = joined.unwrap_or_else(|e| SubmissionOutcome::Failed(IngestError::Worker(e.to_string())));
            on_outcome(id, &outcome);
            report.record(id, outcome);
        }

        report.failures.sort_by_key(|(id, _)| *id);
        report.elapsed = started.elapsed();
        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            stopped_early = report.stopped_early,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingestion finished"
        );
        Ok(report)
    }
}

type ReadItem = io::Result<Record>;

/// Opens `source` on a blocking thread and streams its records back. Fails
/// only when the source cannot be opened at all.
async fn spawn_reader<R>(
    source: Arc<R>,
    cancel: CancellationToken,
) -> Result<(mpsc::Receiver<ReadItem>, tokio::task::JoinHandle<()>), IngestError>
where
    R: RecordSource + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel::<ReadItem>(READ_AHEAD);
    let (opened_tx, opened_rx) = oneshot::channel::<Result<(), String>>();
    let reader = tokio::task::spawn_blocking(move || {
        let records = match source.records() {
            Ok(records) => records,
            Err(e) => {
                let _ = opened_tx.send(Err(format!("{e:#}")));
                return;
            }
        };
        let _ = opened_tx.send(Ok(()));
        for item in records {
            if cancel.is_cancelled() || tx.blocking_send(item).is_err() {
                return;
            }
        }
    });
    match opened_rx.await {
        Ok(Ok(())) => Ok((rx, reader)),
        Ok(Err(e)) => Err(IngestError::Source(e)),
        Err(_) => Err(IngestError::Source(match reader.await {
            Err(e) => format!("record reader died while opening the source: {e}"),
            Ok(()) => "record reader exited before opening the source".to_string(),
        })),
    }
}

async fn run_task<B, S>(
    record: Record,
    builder: Arc<B>,
    sink: Arc<S>,
    ctx: Arc<BuildContext>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) -> SubmissionOutcome
where
    B: DocumentBuilder,
    S: IndexSink<B::Document>,
{
    let mut task = IngestionTask::new(record.id);
    let Ok(_permit) = permits.acquire_owned().await else {
        return task.finish(SubmissionOutcome::Failed(IngestError::Worker("worker pool closed".to_string())));
    };
    if cancel.is_cancelled() {
        return task.finish(SubmissionOutcome::Cancelled);
    }

    task.advance(TaskState::Building);
    let document = match builder.build(&record, &ctx) {
        Ok(Some(document)) => document,
        Ok(None) => return task.finish(SubmissionOutcome::Skipped),
        Err(e) => return task.finish(SubmissionOutcome::Failed(e)),
    };

    task.advance(TaskState::Submitting);
    match sink.submit(document).await {
        Ok(generation) => task.finish(SubmissionOutcome::Succeeded(generation)),
        Err(e) => task.finish(SubmissionOutcome::Failed(e)),
    }
}
