use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use typeahead_core::{SuggestError, SuggestResult};

use crate::index::CompletionIndex;

/// Name → live index generation.
///
/// Passed explicitly to whatever builds indices and to the resolver. Lookups
/// take an `Arc` snapshot, so installing a new generation never disturbs a
/// query already running against the old one.
#[derive(Debug, Default)]
pub struct SuggesterRegistry {
    live: RwLock<HashMap<String, Arc<CompletionIndex>>>,
}

impl SuggesterRegistry {
    pub fn new() -> Self { Self::default() }

    /// Makes `index` the live generation for its name, returning the one it
    /// replaced.
    pub fn install(&self, index: CompletionIndex) -> Option<Arc<CompletionIndex>> {
        let name = index.name().to_string();
        let generation = index.generation();
        let previous = self.live.write().insert(name.clone(), Arc::new(index));
        tracing::info!(
            suggester = %name,
            generation,
            replaced = previous.as_ref().map(|p| p.generation()),
            "installed suggester"
        );
        previous
    }

    pub fn remove(&self, name: &str) -> Option<Arc<CompletionIndex>> {
        self.live.write().remove(name)
    }

    pub fn resolve(&self, name: &str) -> SuggestResult<Arc<CompletionIndex>> {
        let live = self.live.read();
        match live.get(name) {
            Some(index) => Ok(Arc::clone(index)),
            None => {
                let mut valid: Vec<String> = live.keys().cloned().collect();
                valid.sort();
                Err(SuggestError::UnknownSuggester { name: name.to_string(), valid })
            }
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize { self.live.read().len() }

    pub fn is_empty(&self) -> bool { self.live.read().is_empty() }
}
