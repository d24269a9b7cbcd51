//! Token accounting.
//!
//! The default is a word-based approximation at 1.3 tokens per word
//! (split on Unicode whitespace). With the `exact-tokens` feature a real
//! tokenizer is consulted instead, falling back to the approximation if
//! it is unavailable. Counting is O(n) and always performed on the exact
//! string handed back to the caller.

const TOKENS_PER_WORD: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMode {
    #[default]
    Approximate,
    Exact,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter {
    mode: TokenMode,
}

impl TokenCounter {
    pub fn new(mode: TokenMode) -> Self {
        Self { mode }
    }

    pub fn count(&self, text: &str) -> usize {
        match self.mode {
            TokenMode::Approximate => approximate(text),
            TokenMode::Exact => exact(text).unwrap_or_else(|| approximate(text)),
        }
    }
}

fn approximate(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * TOKENS_PER_WORD).ceil() as usize
}

#[cfg(feature = "exact-tokens")]
fn exact(text: &str) -> Option<usize> {
    use std::sync::OnceLock;
    use tiktoken_rs::CoreBPE;

    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

    BPE.get_or_init(|| tiktoken_rs::cl100k_base().ok())
        .as_ref()
        .map(|bpe| bpe.encode_ordinary(text).len())
}

#[cfg(not(feature = "exact-tokens"))]
fn exact(_text: &str) -> Option<usize> {
    None
}
