//! typeahead-text
//!
//! Casefolding analysis, the weighted completion index, the suggester
//! registry and the lookup resolver.
pub mod analysis;
pub mod index;
pub mod registry;
pub mod resolver;

pub use index::{CompletionIndex, CompletionIndexBuilder, LookupHit};
pub use registry::SuggesterRegistry;
pub use resolver::SuggestionResolver;
