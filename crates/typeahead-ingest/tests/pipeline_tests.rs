use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use typeahead_core::config::MatchMode;
use typeahead_core::traits::{DocumentBuilder, IndexSink, RecordSource};
use typeahead_core::types::{BuildContext, CompletionEntry, Generation, LookupQuery, Record};
use typeahead_core::IngestError;
use typeahead_ingest::{BulkIngestionCoordinator, CompletionSink, JsonLineBuilder, LineSource, MemorySource, TaskState};
use typeahead_text::{SuggesterRegistry, SuggestionResolver};

fn ctx() -> BuildContext {
    BuildContext { index_name: "places".to_string() }
}

fn line(text: &str, weight: u64) -> String {
    format!("{{\"text\": \"{text}\", \"weight\": {weight}}}")
}

/// Counts submissions and tracks how many were in flight at once.
#[derive(Default)]
struct SlowSink {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    submitted: AtomicUsize,
    cancel_after_first: Option<tokio_util::sync::CancellationToken>,
}

#[async_trait]
impl IndexSink<CompletionEntry> for SlowSink {
    async fn submit(&self, _document: CompletionEntry) -> Result<Generation, IngestError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }
        Ok(self.submitted.fetch_add(1, Ordering::SeqCst) as u64 + 1)
    }

    async fn commit(&self) -> Result<Generation, IngestError> {
        Ok(0)
    }
}

#[tokio::test]
async fn malformed_records_fail_alone() {
    let mut lines: Vec<String> = (0..10).map(|i| line(&format!("place {i}"), i)).collect();
    lines[2] = "{not json".to_string();
    lines[5] = "{\"text\": \"\", \"weight\": 3}".to_string();
    lines[9] = "{\"weight\": 3}".to_string();
    let source = MemorySource::new(lines);
    let sink = Arc::new(SlowSink::default());

    let report = BulkIngestionCoordinator::new(3)
        .ingest(Arc::new(source), Arc::new(JsonLineBuilder), Arc::clone(&sink), ctx())
        .await
        .expect("ingest");

    assert_eq!(report.processed, 10);
    assert_eq!(report.succeeded, 7);
    assert_eq!(report.failed, 3);
    assert_eq!(report.failures.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![3, 6, 10]);
    assert!(report.failures.iter().all(|(_, e)| matches!(e, IngestError::Build(_))));
    assert_eq!(sink.submitted.load(Ordering::SeqCst), 7);
    assert!(!report.is_clean());
}

#[tokio::test]
async fn blank_lines_are_skipped() {
    let source = MemorySource::new(vec![line("a", 1), String::new(), "   ".to_string(), line("b", 2)]);
    let report = BulkIngestionCoordinator::new(2)
        .ingest(Arc::new(source), Arc::new(JsonLineBuilder), Arc::new(SlowSink::default()), ctx())
        .await
        .expect("ingest");
    assert_eq!((report.succeeded, report.skipped, report.failed), (2, 2, 0));
    assert!(report.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_size_bounds_concurrent_submissions() {
    let source = MemorySource::new((0..24).map(|i| line(&format!("k{i}"), i)));
    let sink = Arc::new(SlowSink::default());
    let report = BulkIngestionCoordinator::new(2)
        .ingest(Arc::new(source), Arc::new(JsonLineBuilder), Arc::clone(&sink), ctx())
        .await
        .expect("ingest");
    assert_eq!(report.succeeded, 24);
    let peak = sink.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak in-flight {peak}");
}

#[tokio::test]
async fn cancellation_lets_in_flight_finish_and_cancels_queued() {
    let coordinator = BulkIngestionCoordinator::new(1);
    let sink = Arc::new(SlowSink { cancel_after_first: Some(coordinator.cancellation_token()), ..Default::default() });
    let source = MemorySource::new((0..5).map(|i| line(&format!("k{i}"), i)));
    let report = coordinator.ingest(Arc::new(source), Arc::new(JsonLineBuilder), sink, ctx()).await.expect("ingest");
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    // Whatever was dispatched before the token fired ends as cancelled; the
    // rest was never read.
    assert_eq!(report.processed, 1 + report.cancelled);
    assert!(report.processed == 5 || report.stopped_early);
    assert!(!report.is_clean());
}

struct PanickyBuilder;

impl DocumentBuilder for PanickyBuilder {
    type Document = CompletionEntry;

    fn build(&self, record: &Record, _ctx: &BuildContext) -> Result<Option<CompletionEntry>, IngestError> {
        if record.line == "boom" {
            panic!("builder exploded");
        }
        Ok(Some(CompletionEntry::new(record.line.clone(), record.id)))
    }
}

#[tokio::test]
async fn panicking_task_is_a_worker_failure() {
    let source = MemorySource::new(vec!["ok", "boom", "fine"]);
    let report = BulkIngestionCoordinator::new(2)
        .ingest(Arc::new(source), Arc::new(PanickyBuilder), Arc::new(SlowSink::default()), ctx())
        .await
        .expect("ingest");
    assert_eq!((report.succeeded, report.failed), (2, 1));
    assert_eq!(report.failures[0].0, 2);
    assert!(matches!(report.failures[0].1, IngestError::Worker(_)));
}

#[tokio::test]
async fn ingest_commit_then_suggest() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("nested")).expect("mkdir");
    std::fs::write(
        dir.path().join("a.jsonl"),
        format!(
            "{}\n{}\n",
            line("pizza place", 100),
            "{\"text\": \"pizza hut\", \"weight\": 80, \"contexts\": [\"west-side\"], \"payload\": \"hut-7\"}"
        ),
    )
    .expect("write");
    std::fs::write(dir.path().join("nested/b.jsonl"), format!("{}\n", line("sushi bar", 60))).expect("write");
    std::fs::write(dir.path().join("ignored.csv"), "x,y\n").expect("write");

    let source = LineSource::new(dir.path());
    assert_eq!(source.files().expect("files").len(), 2);

    let registry = Arc::new(SuggesterRegistry::new());
    let sink = Arc::new(CompletionSink::new("places", MatchMode::Infix, Arc::clone(&registry)));
    let report = BulkIngestionCoordinator::new(2)
        .ingest(Arc::new(source), Arc::new(JsonLineBuilder), Arc::clone(&sink), ctx())
        .await
        .expect("ingest");
    assert_eq!(report.succeeded, 3);

    // Nothing is visible until the caller commits.
    assert!(registry.resolve("places").is_err());
    let generation = sink.commit().await.expect("commit");
    assert_eq!(generation, 1);

    let resolver = SuggestionResolver::new(&registry);
    let out = resolver.resolve(&LookupQuery::new("places", "pizza")).expect("lookup");
    assert_eq!(out.iter().map(|s| s.key.text()).collect::<Vec<_>>(), vec!["pizza place", "pizza hut"]);
    let west = resolver.resolve(&LookupQuery::new("places", "pizza").context("west-side")).expect("lookup");
    assert_eq!(west.len(), 1);
    assert_eq!(west[0].payload.as_deref(), Some("hut-7"));
}

#[tokio::test]
async fn sink_rejections_are_submission_failures() {
    let registry = Arc::new(SuggesterRegistry::new());
    let sink = Arc::new(CompletionSink::new("short", MatchMode::Prefix, Arc::clone(&registry)).with_max_key_len(Some(5)));
    let source = MemorySource::new(vec![line("tiny", 1), line("much too long", 2)]);
    let report = BulkIngestionCoordinator::new(1)
        .ingest(Arc::new(source), Arc::new(JsonLineBuilder), Arc::clone(&sink), ctx())
        .await
        .expect("ingest");
    assert_eq!((report.succeeded, report.failed), (1, 1));
    assert!(matches!(report.failures[0], (2, IngestError::Submission(_))));
    sink.commit().await.expect("commit");
    assert_eq!(registry.resolve("short").expect("live").len(), 1);
}

#[tokio::test]
async fn missing_source_is_an_error_before_dispatch() {
    let source = LineSource::new("/definitely/not/here");
    assert!(source.records().is_err());
    let err = BulkIngestionCoordinator::new(1)
        .ingest(Arc::new(source), Arc::new(JsonLineBuilder), Arc::new(SlowSink::default()), ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Source(_)));
}

#[tokio::test]
async fn undecodable_line_fails_alone_and_reading_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mixed.jsonl");
    let mut bytes = format!("{}\n", line("first", 1)).into_bytes();
    bytes.extend_from_slice(b"{\"text\": \"caf\xff\"}\n");
    for i in 0..5 {
        bytes.extend_from_slice(format!("{}\n", line(&format!("after {i}"), i)).as_bytes());
    }
    std::fs::write(&path, bytes).expect("write");

    let sink = Arc::new(SlowSink::default());
    let report = BulkIngestionCoordinator::new(2)
        .ingest(Arc::new(LineSource::new(&path)), Arc::new(JsonLineBuilder), Arc::clone(&sink), ctx())
        .await
        .expect("ingest");

    assert_eq!(report.processed, 7);
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.failed, 1);
    assert!(matches!(report.failures[0], (2, IngestError::Source(_))));
    assert!(!report.stopped_early);
    assert_eq!(sink.submitted.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn source_error_items_are_recorded_with_their_position() {
    struct Flaky;
    impl RecordSource for Flaky {
        fn describe(&self) -> String { "flaky".to_string() }
        fn records(&self) -> anyhow::Result<Box<dyn Iterator<Item = std::io::Result<Record>> + Send + '_>> {
            let items = (1..=6u64).map(|id| {
                if id % 3 == 0 {
                    Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("bad record {id}")))
                } else {
                    Ok(Record { id, line: line(&format!("k{id}"), id) })
                }
            });
            Ok(Box::new(items))
        }
    }

    let report = BulkIngestionCoordinator::new(3)
        .ingest(Arc::new(Flaky), Arc::new(JsonLineBuilder), Arc::new(SlowSink::default()), ctx())
        .await
        .expect("ingest");
    assert_eq!((report.processed, report.succeeded, report.failed), (6, 4, 2));
    assert_eq!(report.failures.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![3, 6]);
}

#[test]
fn task_state_transitions() {
    use TaskState::*;
    assert!(Queued.can_advance_to(Building));
    assert!(Building.can_advance_to(Submitting));
    assert!(Submitting.can_advance_to(Succeeded));
    assert!(Building.can_advance_to(Failed));
    assert!(!Queued.can_advance_to(Succeeded));
    for terminal in [Succeeded, Failed, Skipped, Cancelled] {
        assert!(terminal.is_terminal());
        for next in [Queued, Building, Submitting, Succeeded, Failed] {
            assert!(!terminal.can_advance_to(next));
        }
    }
}
