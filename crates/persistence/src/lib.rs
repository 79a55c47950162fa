//! Persistence layer for the voice buddy
//!
//! Provides storage for:
//! - Completed turns, one row per `(conversation_id, step)`
//! - Passive chatter heard while no conversation is active
//!
//! Backends: SQLite (default) and process memory.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

use std::sync::Arc;

pub use error::PersistenceError;
pub use memory::InMemoryTurnStore;
pub use sqlite::SqliteTurnStore;
pub use store::TurnStore;

use voice_buddy_config::{PersistenceBackend, PersistenceConfig};

/// Open the store selected in configuration
pub fn open_store(config: &PersistenceConfig) -> Result<Arc<dyn TurnStore>, PersistenceError> {
    let store: Arc<dyn TurnStore> = match config.backend {
        PersistenceBackend::Sqlite => Arc::new(SqliteTurnStore::open(&config.db_path)?),
        PersistenceBackend::Memory => Arc::new(InMemoryTurnStore::new()),
    };
    tracing::info!(backend = store.name(), "Turn store ready");
    Ok(store)
}
