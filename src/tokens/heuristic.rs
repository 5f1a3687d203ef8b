//! Character-ratio token estimate.

use async_trait::async_trait;

use super::{TokenCounter, TokenCounterContext};

/// Average characters per token assumed by the heuristic.
pub const CHARS_PER_TOKEN: usize = 4;

/// `ceil(chars * 0.25)` over Unicode scalar values.
///
/// Ignores provider, model and mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl HeuristicTokenCounter {
    pub fn new() -> Self {
        Self
    }

    /// Estimate tokens for `text`.
    pub fn count(text: &str) -> usize {
        Self::tokens_for_chars(text.chars().count())
    }

    /// Estimate tokens for a system + user message pair.
    pub fn count_messages(system: Option<&str>, user: &str) -> usize {
        let chars = system.map_or(0, |s| s.chars().count()) + user.chars().count();
        Self::tokens_for_chars(chars)
    }

    fn tokens_for_chars(chars: usize) -> usize {
        chars.div_ceil(CHARS_PER_TOKEN)
    }
}

#[async_trait]
impl TokenCounter for HeuristicTokenCounter {
    async fn count_text_tokens(&self, text: &str, _context: &TokenCounterContext) -> usize {
        Self::count(text)
    }

    async fn count_message_tokens(
        &self,
        system: Option<&str>,
        user: &str,
        _context: &TokenCounterContext,
    ) -> usize {
        Self::count_messages(system, user)
    }
}
