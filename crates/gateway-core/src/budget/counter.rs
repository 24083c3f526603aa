//! Token estimation for the budget gate.
//!
//! The gate runs before any upstream I/O, so the count is a length heuristic
//! (characters / 4, rounded up) rather than a real tokenizer.

use crate::context::ContextEntry;
use std::sync::Arc;

/// Trait for token counting implementations.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string.
    fn count_text(&self, text: &str) -> u64;

    /// Count tokens across rolling context entries.
    fn count_entries(&self, entries: &[ContextEntry]) -> u64 {
        entries
            .iter()
            .map(|entry| self.count_text(&entry.content))
            .fold(0u64, |acc, x| acc.saturating_add(x))
    }
}

/// Heuristic token counter using character-based estimation.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
}

impl HeuristicTokenCounter {
    pub fn new(chars_per_token: f64) -> Self {
        Self {
            chars_per_token: if chars_per_token > 0.0 {
                chars_per_token
            } else {
                4.0
            },
        }
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count() as f64;
        (char_count / self.chars_per_token).ceil() as u64
    }
}

/// Estimate tokens with the default heuristic.
pub fn estimate_tokens(text: &str) -> u64 {
    HeuristicTokenCounter::default().count_text(text)
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up_partial_tokens() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("Hello, world!"), 4);
    }

    #[test]
    fn estimate_empty_text_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 4 multi-byte characters, 12 bytes
        assert_eq!(estimate_tokens("日本語だ"), 1);
    }

    #[test]
    fn custom_chars_per_token() {
        let counter = HeuristicTokenCounter::new(2.0);
        assert_eq!(counter.count_text("test"), 2);
    }

    #[test]
    fn non_positive_ratio_falls_back_to_default() {
        let counter = HeuristicTokenCounter::new(0.0);
        assert_eq!(counter.count_text("abcdefgh"), 2);
    }

    #[test]
    fn counts_context_entries() {
        let counter = HeuristicTokenCounter::default();
        let entries = vec![
            ContextEntry::user("abcdefgh"),
            ContextEntry::assistant("abcd", None, None),
        ];
        assert_eq!(counter.count_entries(&entries), 3);
    }
}
