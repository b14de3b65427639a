//! Input token estimation.
//!
//! Admission control needs a token count before any provider has seen the
//! prompt, so the gateway estimates it. The estimate only has to be stable
//! and roughly proportional; providers report the real count afterwards.

use crate::request::ChatMessage;

/// Estimates token counts for admission control
pub trait TokenEstimator: Send + Sync {
    /// Estimated tokens of a piece of text
    fn estimate_text(&self, text: &str) -> u32;

    /// Estimated input tokens of a conversation (at least 1)
    fn estimate_messages(&self, messages: &[ChatMessage]) -> u32;
}

/// Character-count heuristic: one token per four characters
#[derive(Debug, Clone, Copy)]
pub struct CharTokenEstimator {
    chars_per_token: u32,
    per_message_overhead: u32,
}

impl CharTokenEstimator {
    /// Create an estimator with custom ratios
    #[must_use]
    pub fn new(chars_per_token: u32, per_message_overhead: u32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            per_message_overhead,
        }
    }
}

impl Default for CharTokenEstimator {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl TokenEstimator for CharTokenEstimator {
    fn estimate_text(&self, text: &str) -> u32 {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        chars.div_ceil(self.chars_per_token)
    }

    fn estimate_messages(&self, messages: &[ChatMessage]) -> u32 {
        messages
            .iter()
            .map(|m| {
                self.estimate_text(&m.content)
                    .saturating_add(self.per_message_overhead)
            })
            .fold(0u32, u32::saturating_add)
            .max(1)
    }
}
