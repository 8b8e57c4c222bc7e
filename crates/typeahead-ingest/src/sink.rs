use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use typeahead_core::config::MatchMode;
use typeahead_core::traits::IndexSink;
use typeahead_core::types::{CompletionEntry, Generation};
use typeahead_core::IngestError;
use typeahead_text::{CompletionIndexBuilder, SuggesterRegistry};

/// In-process sink that collects completion entries and, on commit, builds
/// them into a new suggester generation installed into a registry.
///
/// Submissions before a commit are invisible to lookups.
pub struct CompletionSink {
    name: String,
    mode: MatchMode,
    registry: Arc<SuggesterRegistry>,
    max_key_len: Option<usize>,
    accepted: Mutex<Vec<CompletionEntry>>,
    submissions: AtomicU64,
    commits: AtomicU64,
}

impl CompletionSink {
    pub fn new(name: impl Into<String>, mode: MatchMode, registry: Arc<SuggesterRegistry>) -> Self {
        Self {
            name: name.into(),
            mode,
            registry,
            max_key_len: None,
            accepted: Mutex::new(Vec::new()),
            submissions: AtomicU64::new(0),
            commits: AtomicU64::new(0),
        }
    }

    /// Rejects keys longer than `len` bytes.
    #[must_use]
    pub fn with_max_key_len(mut self, len: Option<usize>) -> Self {
        self.max_key_len = len;
        self
    }

    pub fn name(&self) -> &str { &self.name }

    /// Documents accepted so far, committed or not.
    pub fn accepted(&self) -> usize { self.accepted.lock().len() }
}

#[async_trait]
impl IndexSink<CompletionEntry> for CompletionSink {
    async fn submit(&self, document: CompletionEntry) -> Result<Generation, IngestError> {
        if let Some(max) = self.max_key_len {
            if document.key.len() > max {
                return Err(IngestError::Submission(format!(
                    "key of {} bytes exceeds limit of {max} for suggester {}",
                    document.key.len(),
                    self.name
                )));
            }
        }
        self.accepted.lock().push(document);
        Ok(self.submissions.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn commit(&self) -> Result<Generation, IngestError> {
        let generation = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        let mut builder = CompletionIndexBuilder::new(self.name.clone(), self.mode);
        builder.extend(self.accepted.lock().iter().cloned());
        let entries = builder.len();
        self.registry.install(builder.build(generation));
        tracing::info!(suggester = %self.name, generation, entries, "committed suggester");
        Ok(generation)
    }
}
