//! Turn store trait

use async_trait::async_trait;

use voice_buddy_core::{Chatter, Exchange, Turn};

use crate::PersistenceError;

/// Storage for completed turns and passive chatter
///
/// Implementations serialize writes internally so one store can be shared
/// behind an `Arc`.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Persist a turn; `(conversation_id, step)` must be new and the step
    /// must exceed every step already stored for the conversation
    async fn insert_turn(&self, turn: &Turn) -> Result<(), PersistenceError>;

    /// Persist input heard while passive
    async fn insert_chatter(&self, chatter: &Chatter) -> Result<(), PersistenceError>;

    /// Highest conversation id ever stored
    async fn max_conversation_id(&self) -> Result<Option<i64>, PersistenceError>;

    /// Exchanges of a conversation, ascending by step
    async fn exchanges(&self, conversation_id: i64) -> Result<Vec<Exchange>, PersistenceError>;

    /// Full turns of a conversation, ascending by step
    async fn turns(&self, conversation_id: i64) -> Result<Vec<Turn>, PersistenceError>;

    /// Number of chatter rows stored
    async fn chatter_count(&self) -> Result<usize, PersistenceError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
