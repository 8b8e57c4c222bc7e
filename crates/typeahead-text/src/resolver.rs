use typeahead_core::types::{Highlight, LookupQuery, LookupRequest, Suggestion, SuggestionKey, DEFAULT_SUGGEST_COUNT};
use typeahead_core::{SuggestError, SuggestResult};

use crate::index::LookupHit;
use crate::registry::SuggesterRegistry;

/// Answers lookup queries against the suggesters in a registry.
///
/// A highlight request against a suggester that cannot highlight falls back
/// to plain keys.
pub struct SuggestionResolver<'r> {
    registry: &'r SuggesterRegistry,
}

impl<'r> SuggestionResolver<'r> {
    pub fn new(registry: &'r SuggesterRegistry) -> Self { Self { registry } }

    /// Validates a wire request and resolves it.
    pub fn handle(&self, request: LookupRequest) -> SuggestResult<Vec<Suggestion>> {
        let query = LookupQuery::try_from(request)?;
        self.resolve(&query)
    }

    pub fn resolve(&self, query: &LookupQuery) -> SuggestResult<Vec<Suggestion>> {
        let count = if query.count == 0 { DEFAULT_SUGGEST_COUNT } else { query.count };
        let index = self.registry.resolve(&query.index_name)?;
        let highlight = query.want_highlight && index.supports_highlight();
        if query.want_highlight && !highlight {
            tracing::debug!(suggester = %query.index_name, mode = ?index.mode(), "highlight unsupported, returning plain keys");
        }

        let hits = index.lookup(&query.text, query.contexts.as_ref(), count, query.all_terms_required);
        let suggestions = hits
            .into_iter()
            .map(|hit| to_suggestion(hit, highlight))
            .collect::<SuggestResult<Vec<_>>>()?;
        tracing::debug!(
            suggester = %query.index_name,
            generation = index.generation(),
            text = %query.text,
            results = suggestions.len(),
            "suggest lookup"
        );
        Ok(suggestions)
    }
}

fn to_suggestion(hit: LookupHit<'_>, highlight: bool) -> SuggestResult<Suggestion> {
    let entry = hit.entry;
    let key = match hit.spans {
        Some(spans) if highlight => SuggestionKey::Highlight(Highlight::from_spans(&entry.key, &spans)),
        _ => SuggestionKey::Key(entry.key.clone()),
    };
    let payload = entry
        .payload
        .as_ref()
        .map(|bytes| {
            String::from_utf8(bytes.clone())
                .map_err(|e| SuggestError::DataIntegrity { key: entry.key.clone(), reason: e.to_string() })
        })
        .transpose()?;
    Ok(Suggestion { key, weight: entry.weight, payload })
}
