//! In-memory turn store
//!
//! Nothing survives a restart. Used with `--memory` and in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use voice_buddy_core::{Chatter, Exchange, Turn};

use crate::{PersistenceError, TurnStore};

#[derive(Default)]
pub struct InMemoryTurnStore {
    /// Keyed by `(conversation_id, step)`, so iteration is ordered
    turns: RwLock<BTreeMap<(i64, i64), Turn>>,
    chatter: RwLock<Vec<Chatter>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conversation(&self, conversation_id: i64) -> Vec<Turn> {
        self.turns
            .read()
            .range((conversation_id, i64::MIN)..=(conversation_id, i64::MAX))
            .map(|(_, turn)| turn.clone())
            .collect()
    }
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    async fn insert_turn(&self, turn: &Turn) -> Result<(), PersistenceError> {
        let mut turns = self.turns.write();
        let key = (turn.conversation_id, turn.step);

        if turns.contains_key(&key) {
            return Err(PersistenceError::DuplicateTurn {
                conversation_id: turn.conversation_id,
                step: turn.step,
            });
        }
        let latest = turns
            .range((turn.conversation_id, i64::MIN)..=(turn.conversation_id, i64::MAX))
            .next_back()
            .map(|((_, step), _)| *step);
        if let Some(latest) = latest.filter(|latest| *latest > turn.step) {
            return Err(PersistenceError::StepOutOfOrder {
                conversation_id: turn.conversation_id,
                step: turn.step,
                latest,
            });
        }

        turns.insert(key, turn.clone());
        Ok(())
    }

    async fn insert_chatter(&self, chatter: &Chatter) -> Result<(), PersistenceError> {
        self.chatter.write().push(chatter.clone());
        Ok(())
    }

    async fn max_conversation_id(&self) -> Result<Option<i64>, PersistenceError> {
        Ok(self.turns.read().keys().next_back().map(|(id, _)| *id))
    }

    async fn exchanges(&self, conversation_id: i64) -> Result<Vec<Exchange>, PersistenceError> {
        Ok(self.conversation(conversation_id).iter().map(Exchange::from).collect())
    }

    async fn turns(&self, conversation_id: i64) -> Result<Vec<Turn>, PersistenceError> {
        Ok(self.conversation(conversation_id))
    }

    async fn chatter_count(&self) -> Result<usize, PersistenceError> {
        Ok(self.chatter.read().len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use voice_buddy_core::ListeningMode;

    pub(crate) fn turn(conversation_id: i64, step: i64, input: &str, response: &str) -> Turn {
        Turn {
            conversation_id,
            step,
            timestamp: Utc::now(),
            model: "test-model".to_string(),
            prompt_template: "baseline".to_string(),
            prompt_formatted: "prompt".to_string(),
            human_input_raw: input.to_string(),
            human_input_corrected: input.to_string(),
            llm_output_raw: format!("response: {}\n}}", response),
            response: response.to_string(),
            human_emotion: "neutral".to_string(),
            reaction_emotion: "happiness".to_string(),
            intent: String::new(),
            action: String::new(),
            tool: String::new(),
            tool_input: String::new(),
            entities: String::new(),
            history: String::new(),
            listening_mode: ListeningMode::Active,
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let store = InMemoryTurnStore::new();
        assert_eq!(store.max_conversation_id().await.unwrap(), None);

        store.insert_turn(&turn(2, 1, "b", "B")).await.unwrap();
        store.insert_turn(&turn(2, 0, "a", "A")).await.unwrap_err();
        store.insert_turn(&turn(1, 0, "x", "X")).await.unwrap();

        assert_eq!(store.max_conversation_id().await.unwrap(), Some(2));
        let exchanges = store.exchanges(2).await.unwrap();
        assert_eq!(exchanges, vec![Exchange::new(1, "b", "B")]);
        assert!(store.exchanges(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_turn_rejected() {
        let store = InMemoryTurnStore::new();
        store.insert_turn(&turn(1, 0, "a", "A")).await.unwrap();

        let err = store.insert_turn(&turn(1, 0, "again", "again")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::DuplicateTurn { conversation_id: 1, step: 0 }));
    }

    #[tokio::test]
    async fn test_step_order_enforced() {
        let store = InMemoryTurnStore::new();
        store.insert_turn(&turn(1, 3, "a", "A")).await.unwrap();

        let err = store.insert_turn(&turn(1, 2, "b", "B")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::StepOutOfOrder { latest: 3, .. }));
    }

    #[tokio::test]
    async fn test_chatter() {
        let store = InMemoryTurnStore::new();
        store.insert_chatter(&Chatter::new("just talking")).await.unwrap();
        assert_eq!(store.chatter_count().await.unwrap(), 1);
        assert_eq!(store.max_conversation_id().await.unwrap(), None);
    }
}
