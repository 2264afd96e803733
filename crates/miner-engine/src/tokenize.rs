//! Tokenizer with stopword removal

use std::collections::HashSet;
use tracing::warn;

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "more", "most", "no", "not",
    "of", "on", "one", "or", "other", "our", "out", "she", "so", "some", "such", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "to", "up", "was", "we",
    "were", "what", "when", "which", "who", "will", "with", "would", "you", "your",
];

/// Splits text into lowercase word tokens
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
}

impl Tokenizer {
    /// Tokenizer using a built-in list (`none` or `en`) plus extra words
    #[must_use]
    pub fn new<I, S>(language: &str, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stopwords: HashSet<String> = match language {
            "en" | "english" => ENGLISH_STOPWORDS.iter().map(|w| (*w).to_string()).collect(),
            "none" | "" => HashSet::new(),
            other => {
                warn!(language = other, "unknown stopword language, using none");
                HashSet::new()
            }
        };
        stopwords.extend(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
        Self { stopwords }
    }

    /// Tokens of `text` in order, stopwords removed
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !self.stopwords.contains(t))
            .collect()
    }

    /// Whether a word is a stopword
    #[inline]
    #[must_use]
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_lowercases() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            tokenizer.tokenize("Hello, World! 42 times"),
            vec!["hello", "world", "42", "times"]
        );
    }

    #[test]
    fn removes_builtin_and_extra_stopwords() {
        let tokenizer = Tokenizer::new("en", ["Foo"]);
        assert_eq!(tokenizer.tokenize("the foo and the bar"), vec!["bar"]);
        assert!(tokenizer.is_stopword("foo"));
    }

    #[test]
    fn none_language_keeps_everything() {
        let tokenizer = Tokenizer::new("none", [""]);
        assert_eq!(tokenizer.tokenize("the cat"), vec!["the", "cat"]);
    }

    proptest::proptest! {
        #[test]
        fn tokens_are_lowercase_alphanumeric(text in "[a-zA-Z0-9 ,.!?-]{0,80}") {
            let tokenizer = Tokenizer::new("en", ["extra"]);
            for token in tokenizer.tokenize(&text) {
                proptest::prop_assert!(!token.is_empty());
                proptest::prop_assert!(token.chars().all(char::is_alphanumeric));
                proptest::prop_assert!(!tokenizer.is_stopword(&token));
            }
        }
    }
}
