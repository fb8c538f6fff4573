//! Deterministic token counting.
//!
//! `tiktoken-rs`'s `cl100k_base` vocabulary is used purely as a
//! deterministic, GPT-family-compatible counter for budgeting and
//! statistics — not for constructing a prompt for any particular model.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

/// Lazily-constructed, cached tokenizer. An instance rather than a static
/// function so the vocabulary is built once per counter and reused.
#[derive(Debug, Default)]
pub struct TokenCounter {
    bpe: OnceLock<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self {
            bpe: OnceLock::new(),
        }
    }

    fn bpe(&self) -> &CoreBPE {
        self.bpe.get_or_init(|| {
            tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary is statically embedded")
        })
    }

    /// Number of BPE tokens in `text`.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe().encode_ordinary(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_has_zero_tokens() {
        let counter = TokenCounter::new();
        assert_eq!(counter.count_tokens(""), 0);
    }

    #[test]
    fn counts_are_deterministic_and_cache_reused() {
        let counter = TokenCounter::new();
        let a = counter.count_tokens("Use PyJWT with RS256");
        let b = counter.count_tokens("Use PyJWT with RS256");
        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn longer_text_is_not_fewer_tokens() {
        let counter = TokenCounter::new();
        let short = counter.count_tokens("hello");
        let long = counter.count_tokens("hello there, this is a much longer sentence");
        assert!(long > short);
    }
}
