//! Immutable weighted completion index.
//!
//! Entries are ranked once at build time (weight descending, then key
//! ascending by bytes, then insertion order) and every lookup returns hits in
//! that rank order, so equal-weight ties resolve identically on every run.
//!
//! Two matchers share the ranked entry table:
//! - `Infix`: a sorted vocabulary of analysed key tokens with rank postings.
//!   Complete query terms are found by binary search, the term being typed by
//!   a partition-point range scan over the tokens it prefixes.
//! - `Prefix`: a sorted array of normalized keys, range-scanned the same way.
use std::collections::{BTreeMap, BTreeSet};

use typeahead_core::config::MatchMode;
use typeahead_core::types::{CompletionEntry, ContextTag, Generation, HighlightSpan};

use crate::analysis::{analyze, normalize, with_suggest_analyzer, KeyToken, QueryTerms};

/// One matched entry. `spans` is set only by matchers that support
/// highlighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupHit<'a> {
    pub entry: &'a CompletionEntry,
    pub spans: Option<Vec<HighlightSpan>>,
}

#[derive(Debug)]
struct RankedEntry {
    entry: CompletionEntry,
    tokens: Vec<KeyToken>,
}

#[derive(Debug)]
enum Matcher {
    Infix { vocab: Vec<(String, Vec<u32>)> },
    Prefix { keys: Vec<(String, u32)> },
}

#[derive(Debug)]
pub struct CompletionIndex {
    name: String,
    generation: Generation,
    mode: MatchMode,
    entries: Vec<RankedEntry>,
    matcher: Matcher,
}

impl CompletionIndex {
    pub fn name(&self) -> &str { &self.name }

    pub fn generation(&self) -> Generation { self.generation }

    pub fn mode(&self) -> MatchMode { self.mode }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Whether lookups report matched spans.
    pub fn supports_highlight(&self) -> bool {
        matches!(self.matcher, Matcher::Infix { .. })
    }

    /// Entries in rank order.
    pub fn entries(&self) -> impl Iterator<Item = &CompletionEntry> {
        self.entries.iter().map(|r| &r.entry)
    }

    /// Returns up to `count` entries matching `text`, best first.
    ///
    /// An empty or all-separator `text` matches every entry. With non-empty
    /// `contexts` only entries sharing at least one tag are eligible.
    /// `all_terms_required` switches infix matching from any-term to
    /// every-term; prefix matching always needs the whole query.
    pub fn lookup(
        &self,
        text: &str,
        contexts: Option<&BTreeSet<ContextTag>>,
        count: usize,
        all_terms_required: bool,
    ) -> Vec<LookupHit<'_>> {
        let query = with_suggest_analyzer(|analyzer| QueryTerms::parse(analyzer, text));
        let contexts = contexts.filter(|c| !c.is_empty());
        let ranks: Box<dyn Iterator<Item = u32> + '_> = match self.candidates(&query, all_terms_required) {
            None => Box::new(0..self.entries.len() as u32),
            Some(ranks) => Box::new(ranks.into_iter()),
        };
        ranks
            .map(|rank| &self.entries[rank as usize])
            .filter(|ranked| contexts.map_or(true, |wanted| ranked.entry.has_any_context(wanted)))
            .take(count)
            .map(|ranked| LookupHit {
                entry: &ranked.entry,
                spans: self.supports_highlight().then(|| match_spans(ranked, &query)),
            })
            .collect()
    }

    /// Sorted candidate ranks, or `None` when every entry is a candidate.
    fn candidates(&self, query: &QueryTerms, all_terms_required: bool) -> Option<Vec<u32>> {
        if query.is_empty() {
            return None;
        }
        match &self.matcher {
            Matcher::Infix { vocab } => {
                let mut acc: Option<BTreeSet<u32>> = None;
                for (term, is_prefix) in query.iter() {
                    let postings = term_postings(vocab, term, is_prefix);
                    acc = Some(match acc {
                        None => postings,
                        Some(prev) if all_terms_required => prev.intersection(&postings).copied().collect(),
                        Some(mut prev) => {
                            prev.extend(postings);
                            prev
                        }
                    });
                    if all_terms_required && acc.as_ref().is_some_and(BTreeSet::is_empty) {
                        break;
                    }
                }
                Some(acc.map(|set| set.into_iter().collect()).unwrap_or_default())
            }
            Matcher::Prefix { keys } => {
                let whole = query.terms.join(" ");
                let wanted = query.normalized();
                let start = keys.partition_point(|(k, _)| k.as_str() < whole.as_str());
                let mut ranks: Vec<u32> = keys[start..]
                    .iter()
                    .take_while(|(k, _)| k.starts_with(&whole))
                    .filter(|(k, _)| query.last_is_prefix || *k == whole || k.starts_with(&wanted))
                    .map(|(_, rank)| *rank)
                    .collect();
                ranks.sort_unstable();
                Some(ranks)
            }
        }
    }
}

fn term_postings(vocab: &[(String, Vec<u32>)], term: &str, is_prefix: bool) -> BTreeSet<u32> {
    if is_prefix {
        let start = vocab.partition_point(|(t, _)| t.as_str() < term);
        vocab[start..]
            .iter()
            .take_while(|(t, _)| t.starts_with(term))
            .flat_map(|(_, postings)| postings.iter().copied())
            .collect()
    } else {
        vocab
            .binary_search_by(|(t, _)| t.as_str().cmp(term))
            .map(|i| vocab[i].1.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Byte ranges of the original key covered by query terms. A complete term
/// marks its whole token; the term being typed marks only the typed part.
fn match_spans(ranked: &RankedEntry, query: &QueryTerms) -> Vec<HighlightSpan> {
    let key = ranked.entry.key.as_str();
    let mut spans: Vec<HighlightSpan> = Vec::new();
    for token in &ranked.tokens {
        let mut best = 0usize;
        for (term, is_prefix) in query.iter() {
            let len = if is_prefix && token.text.starts_with(term) {
                original_prefix_len(&key[token.start..token.end], term)
            } else if token.text == term {
                token.end - token.start
            } else {
                0
            };
            best = best.max(len);
        }
        if best == 0 {
            continue;
        }
        let span = HighlightSpan { start: token.start, end: token.start + best };
        match spans.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => spans.push(span),
        }
    }
    spans
}

/// Byte length of the piece of `original` that `normalized_prefix` was typed
/// against. Lowercasing can change the char count (`İ` folds to two chars),
/// so each original char is measured by its folded length.
fn original_prefix_len(original: &str, normalized_prefix: &str) -> usize {
    let wanted = normalized_prefix.chars().count();
    let mut folded = 0usize;
    for (i, c) in original.char_indices() {
        if folded >= wanted {
            return i;
        }
        folded += c.to_lowercase().count();
    }
    original.len()
}

/// Collects entries and freezes them into a [`CompletionIndex`].
#[derive(Debug)]
pub struct CompletionIndexBuilder {
    name: String,
    mode: MatchMode,
    entries: Vec<CompletionEntry>,
}

impl CompletionIndexBuilder {
    pub fn new(name: impl Into<String>, mode: MatchMode) -> Self {
        Self { name: name.into(), mode, entries: Vec::new() }
    }

    pub fn add(&mut self, entry: CompletionEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn build(mut self, generation: Generation) -> CompletionIndex {
        // Stable: equal weight and key keep insertion order.
        self.entries.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.key.cmp(&b.key)));

        let entries: Vec<RankedEntry> = with_suggest_analyzer(|analyzer| {
            self.entries
                .into_iter()
                .map(|entry| {
                    let tokens = analyze(analyzer, &entry.key);
                    RankedEntry { entry, tokens }
                })
                .collect()
        });

        let matcher = match self.mode {
            MatchMode::Infix => {
                let mut vocab: BTreeMap<String, Vec<u32>> = BTreeMap::new();
                for (rank, ranked) in entries.iter().enumerate() {
                    let rank = rank as u32;
                    for token in &ranked.tokens {
                        let postings = vocab.entry(token.text.clone()).or_default();
                        if postings.last() != Some(&rank) {
                            postings.push(rank);
                        }
                    }
                }
                Matcher::Infix { vocab: vocab.into_iter().collect() }
            }
            MatchMode::Prefix => {
                let mut keys: Vec<(String, u32)> =
                    entries.iter().enumerate().map(|(rank, r)| (normalize(&r.tokens), rank as u32)).collect();
                keys.sort();
                Matcher::Prefix { keys }
            }
        };

        tracing::debug!(suggester = %self.name, generation, entries = entries.len(), mode = ?self.mode, "built completion index");
        CompletionIndex { name: self.name, generation, mode: self.mode, entries, matcher }
    }
}

impl Extend<CompletionEntry> for CompletionIndexBuilder {
    fn extend<I: IntoIterator<Item = CompletionEntry>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}
