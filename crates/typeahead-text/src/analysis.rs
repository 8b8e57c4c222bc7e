use std::cell::RefCell;

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream};

/// One normalized token with its byte range in the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyToken {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Splits on every non-alphanumeric char, then lowercases. Used for keys at
/// build time and for query text at lookup time.
pub fn suggest_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build()
}

thread_local! {
    static ANALYZER: RefCell<TextAnalyzer> = RefCell::new(suggest_analyzer());
}

/// Runs `f` with this thread's cached [`suggest_analyzer`]. Not reentrant.
pub fn with_suggest_analyzer<R>(f: impl FnOnce(&mut TextAnalyzer) -> R) -> R {
    ANALYZER.with(|cell| f(&mut cell.borrow_mut()))
}

pub fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<KeyToken> {
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push(KeyToken { text: token.text.clone(), start: token.offset_from, end: token.offset_to });
    }
    tokens
}

/// Normalized form used by prefix matching: tokens joined by one space.
pub fn normalize(tokens: &[KeyToken]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
}

/// Analysed query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerms {
    pub terms: Vec<String>,
    /// Whether the last term is still being typed and should match as a prefix.
    pub last_is_prefix: bool,
}

impl QueryTerms {
    pub fn parse(analyzer: &mut TextAnalyzer, text: &str) -> Self {
        let tokens = analyze(analyzer, text);
        // A trailing separator means the user finished the last word.
        let last_is_prefix = tokens.last().is_some_and(|t| t.end == text.len());
        Self { terms: tokens.into_iter().map(|t| t.text).collect(), last_is_prefix }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms paired with whether each one matches as a prefix.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        let last = self.terms.len().saturating_sub(1);
        self.terms.iter().enumerate().map(move |(i, t)| (t.as_str(), self.last_is_prefix && i == last))
    }

    pub fn normalized(&self) -> String {
        let mut joined = self.terms.join(" ");
        if !self.last_is_prefix && !joined.is_empty() {
            joined.push(' ');
        }
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_keeps_original_offsets() {
        let mut a = suggest_analyzer();
        let tokens = analyze(&mut a, "Pizza-Hut  Downtown");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["pizza", "hut", "downtown"]);
        assert_eq!((tokens[1].start, tokens[1].end), (6, 9));
        assert_eq!(normalize(&tokens), "pizza hut downtown");
    }

    #[test]
    fn trailing_separator_closes_last_term() {
        let mut a = suggest_analyzer();
        assert!(QueryTerms::parse(&mut a, "pizza h").last_is_prefix);
        let closed = QueryTerms::parse(&mut a, "pizza ");
        assert!(!closed.last_is_prefix);
        assert_eq!(closed.normalized(), "pizza ");
        assert!(QueryTerms::parse(&mut a, "  ").is_empty());
    }

    #[test]
    fn cached_analyzer_is_reused_per_thread() {
        let first = with_suggest_analyzer(|a| a as *const TextAnalyzer as usize);
        let second = with_suggest_analyzer(|a| a as *const TextAnalyzer as usize);
        assert_eq!(first, second);

        let expected = analyze(&mut suggest_analyzer(), "Sushi-Bar East");
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| with_suggest_analyzer(|a| analyze(a, "Sushi-Bar East"))))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("thread"), expected);
        }
    }
}
