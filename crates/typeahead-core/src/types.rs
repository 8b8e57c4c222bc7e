//! Domain types shared by the lookup and ingestion paths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{SuggestError, SuggestResult};

/// Opaque context tag (e.g. a region or category) attached to an entry.
pub type ContextTag = Vec<u8>;

/// Identifier of one index build or one accepted submission.
pub type Generation = u64;

/// Number of suggestions returned when a request leaves `count` unset (0).
pub const DEFAULT_SUGGEST_COUNT: usize = 5;

/// One weighted completion candidate.
///
/// - `key`: the text offered to the user, stored case-preserved
/// - `weight`: ranking score, higher ranks first
/// - `payload`: opaque bytes returned alongside the key
/// - `contexts`: tags a query can filter on; an entry without tags never
///   matches a context-filtered query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEntry {
    pub key: String,
    pub weight: u64,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub contexts: BTreeSet<ContextTag>,
}

impl CompletionEntry {
    pub fn new(key: impl Into<String>, weight: u64) -> Self {
        Self { key: key.into(), weight, payload: None, contexts: BTreeSet::new() }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, tag: impl AsRef<[u8]>) -> Self {
        self.contexts.insert(tag.as_ref().to_vec());
        self
    }

    /// True when this entry carries at least one of `wanted`.
    pub fn has_any_context(&self, wanted: &BTreeSet<ContextTag>) -> bool {
        // Iterate the smaller set.
        if self.contexts.len() <= wanted.len() {
            self.contexts.iter().any(|c| wanted.contains(c))
        } else {
            wanted.iter().any(|c| self.contexts.contains(c))
        }
    }
}

/// Matched byte range `[start, end)` of a key, in original-text offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// One piece of a highlighted key; concatenating every fragment's `text`
/// gives back the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightFragment {
    pub text: String,
    pub is_hit: bool,
}

/// A key with the parts that matched the query marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub fragments: Vec<HighlightFragment>,
}

impl Highlight {
    /// Splits `key` at the given spans. Spans must be sorted, non-overlapping
    /// and lie on char boundaries.
    pub fn from_spans(key: &str, spans: &[HighlightSpan]) -> Self {
        let mut fragments = Vec::with_capacity(spans.len() * 2 + 1);
        let mut cursor = 0usize;
        for span in spans {
            if span.start > cursor {
                fragments.push(HighlightFragment { text: key[cursor..span.start].to_string(), is_hit: false });
            }
            if span.end > span.start {
                fragments.push(HighlightFragment { text: key[span.start..span.end].to_string(), is_hit: true });
            }
            cursor = span.end;
        }
        if cursor < key.len() {
            fragments.push(HighlightFragment { text: key[cursor..].to_string(), is_hit: false });
        }
        Self { fragments }
    }

    /// The full key text.
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    /// Only the matched pieces, in order.
    pub fn hits(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().filter(|f| f.is_hit).map(|f| f.text.as_str())
    }
}

/// Either the plain key or its highlighted form, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKey {
    Key(String),
    Highlight(Highlight),
}

impl SuggestionKey {
    pub fn text(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Highlight(h) => h.text(),
        }
    }
}

/// One row of a lookup response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(flatten)]
    pub key: SuggestionKey,
    pub weight: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Wire shape of a lookup request as an API layer receives it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupRequest {
    pub suggest_name: String,
    pub text: String,
    pub count: i32,
    pub contexts: Vec<String>,
    pub all_terms_required: bool,
    pub highlight: bool,
}

/// A validated lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub index_name: String,
    pub text: String,
    pub count: usize,
    /// `None` means no context filtering.
    pub contexts: Option<BTreeSet<ContextTag>>,
    pub all_terms_required: bool,
    pub want_highlight: bool,
}

impl LookupQuery {
    pub fn new(index_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            text: text.into(),
            count: DEFAULT_SUGGEST_COUNT,
            contexts: None,
            all_terms_required: false,
            want_highlight: false,
        }
    }

    /// Sets the result limit; 0 selects [`DEFAULT_SUGGEST_COUNT`].
    #[must_use]
    pub fn count(mut self, count: usize) -> Self {
        self.count = if count == 0 { DEFAULT_SUGGEST_COUNT } else { count };
        self
    }

    #[must_use]
    pub fn context(mut self, tag: impl AsRef<[u8]>) -> Self {
        self.contexts.get_or_insert_with(BTreeSet::new).insert(tag.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn all_terms_required(mut self, yes: bool) -> Self {
        self.all_terms_required = yes;
        self
    }

    #[must_use]
    pub fn highlight(mut self, yes: bool) -> Self {
        self.want_highlight = yes;
        self
    }
}

impl TryFrom<LookupRequest> for LookupQuery {
    type Error = SuggestError;

    fn try_from(req: LookupRequest) -> SuggestResult<Self> {
        if req.suggest_name.trim().is_empty() {
            return Err(SuggestError::MalformedQuery("suggest_name must not be empty".to_string()));
        }
        let count = usize::try_from(req.count)
            .map_err(|_| SuggestError::MalformedQuery(format!("count must be >= 0, got {}", req.count)))?;
        let contexts = if req.contexts.is_empty() {
            None
        } else {
            Some(req.contexts.into_iter().map(String::into_bytes).collect())
        };
        Ok(Self {
            index_name: req.suggest_name,
            text: req.text,
            count: if count == 0 { DEFAULT_SUGGEST_COUNT } else { count },
            contexts,
            all_terms_required: req.all_terms_required,
            want_highlight: req.highlight,
        })
    }
}

/// One raw line pulled from a record source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position in the source, starting at 1.
    pub id: u64,
    pub line: String,
}

/// Read-only state shared by every document build in one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub index_name: String,
}
