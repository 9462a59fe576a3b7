//! Context windowing for model calls.
//!
//! Only the system instruction and the most recent turns are replayed
//! to the model. The window counts turns, not tokens.

use super::types::PromptMessage;

/// Keep `messages[0]` plus the last `max_pairs * 2` messages after it.
///
/// An empty input yields a single system message built from `system_prompt`.
/// The result length is `min(messages.len(), 1 + 2 * max_pairs)`.
pub fn windowed(messages: &[PromptMessage], max_pairs: usize, system_prompt: &str) -> Vec<PromptMessage> {
    let Some((system, rest)) = messages.split_first() else {
        return vec![PromptMessage::system(system_prompt)];
    };

    let keep = max_pairs.saturating_mul(2).min(rest.len());
    let mut window = Vec::with_capacity(keep + 1);
    window.push(system.clone());
    window.extend_from_slice(&rest[rest.len() - keep..]);
    window
}
