//! Conversation history window
//!
//! Renders the most recent exchanges of a conversation into the text block
//! included in the next prompt.

use std::sync::Arc;

use voice_buddy_core::Exchange;
use voice_buddy_persistence::{PersistenceError, TurnStore};

/// Reads persisted exchanges and formats the recent ones
pub struct HistoryWindow {
    store: Arc<dyn TurnStore>,
    max_steps: usize,
}

impl HistoryWindow {
    pub fn new(store: Arc<dyn TurnStore>, max_steps: usize) -> Self {
        Self { store, max_steps }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// History block for a conversation, empty if nothing qualifies
    pub async fn render(&self, conversation_id: i64) -> Result<String, PersistenceError> {
        let exchanges = self.store.exchanges(conversation_id).await?;
        Ok(format_window(&exchanges, self.max_steps))
    }
}

/// Format exchanges within `max_steps` of the latest step
///
/// Exchanges with an empty corrected input are skipped.
pub fn format_window(exchanges: &[Exchange], max_steps: usize) -> String {
    let Some(max_step) = exchanges.iter().map(|e| e.step).max() else {
        return String::new();
    };
    let floor = max_step.saturating_sub(i64::try_from(max_steps).unwrap_or(i64::MAX));

    let mut window: Vec<&Exchange> = exchanges
        .iter()
        .filter(|e| e.step > floor && !e.corrected_input.is_empty())
        .collect();
    window.sort_by_key(|e| e.step);

    window
        .iter()
        .map(|e| format!("Human: {}\nAI: {}", e.corrected_input, e.response))
        .collect::<Vec<_>>()
        .join("\n")
}
