use serde::Deserialize;
use typeahead_core::traits::DocumentBuilder;
use typeahead_core::types::{BuildContext, CompletionEntry, Record};
use typeahead_core::IngestError;

/// Shape of one suggestion line, e.g.
/// `{"text": "pizza hut", "weight": 80, "payload": "{\"id\":7}", "contexts": ["west-side"]}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuggestionLine {
    text: String,
    weight: u64,
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    contexts: Vec<String>,
}

/// Builds one completion entry per JSON line. Stateless, so it can be shared
/// by every worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLineBuilder;

impl DocumentBuilder for JsonLineBuilder {
    type Document = CompletionEntry;

    fn build(&self, record: &Record, ctx: &BuildContext) -> Result<Option<CompletionEntry>, IngestError> {
        let line = record.line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let parsed: SuggestionLine = serde_json::from_str(line)
            .map_err(|e| IngestError::Build(format!("{} record {}: {e}", ctx.index_name, record.id)))?;
        if parsed.text.trim().is_empty() {
            return Err(IngestError::Build(format!("{} record {}: empty suggestion text", ctx.index_name, record.id)));
        }
        let mut entry = CompletionEntry::new(parsed.text, parsed.weight);
        entry.payload = parsed.payload.map(String::into_bytes);
        entry.contexts = parsed.contexts.into_iter().map(String::into_bytes).collect();
        Ok(Some(entry))
    }
}
