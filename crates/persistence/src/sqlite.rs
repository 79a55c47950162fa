//! SQLite turn store
//!
//! Tables:
//! - `conversation_history`: one row per turn, primary key
//!   `(conversation_id, step)`
//! - `chatter`: input logged while passive

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use voice_buddy_core::{Chatter, Exchange, ListeningMode, Turn};

use crate::{PersistenceError, TurnStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_history (
    conversation_id INTEGER NOT NULL,
    step INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    model TEXT NOT NULL,
    prompt_template TEXT NOT NULL,
    prompt_formatted TEXT NOT NULL,
    human_input_raw TEXT NOT NULL,
    human_input_corrected TEXT NOT NULL,
    llm_output_raw TEXT NOT NULL,
    ai_response TEXT NOT NULL,
    human_emotion TEXT NOT NULL,
    ai_emotion TEXT NOT NULL,
    intent TEXT NOT NULL,
    action TEXT NOT NULL,
    tool TEXT NOT NULL,
    tool_input TEXT NOT NULL,
    entities TEXT NOT NULL,
    memory TEXT NOT NULL,
    listening_mode TEXT NOT NULL,
    PRIMARY KEY (conversation_id, step)
);

CREATE TABLE IF NOT EXISTS chatter (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    human_input_raw TEXT NOT NULL,
    listening_mode TEXT NOT NULL
);
"#;

const TURN_COLUMNS: &str = "conversation_id, step, timestamp, model, prompt_template, prompt_formatted, \
    human_input_raw, human_input_corrected, llm_output_raw, ai_response, human_emotion, ai_emotion, \
    intent, action, tool, tool_input, entities, memory, listening_mode";

/// Turn store backed by a SQLite file
pub struct SqliteTurnStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteTurnStore {
    /// Open or create the database and ensure tables exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn, Some(path.to_path_buf()))?;
        tracing::debug!(path = %path.display(), "SQLite turn store opened");
        Ok(store)
    }

    /// Database living only in memory
    pub fn in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, PersistenceError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await?
    }
}

fn insert_turn(conn: &Connection, turn: &Turn) -> Result<(), PersistenceError> {
    let latest: Option<i64> = conn.query_row(
        "SELECT MAX(step) FROM conversation_history WHERE conversation_id = ?1",
        params![turn.conversation_id],
        |row| row.get(0),
    )?;
    if let Some(latest) = latest.filter(|latest| *latest > turn.step) {
        return Err(PersistenceError::StepOutOfOrder {
            conversation_id: turn.conversation_id,
            step: turn.step,
            latest,
        });
    }

    let result = conn.execute(
        &format!(
            "INSERT INTO conversation_history ({}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            TURN_COLUMNS
        ),
        params![
            turn.conversation_id,
            turn.step,
            turn.timestamp.to_rfc3339(),
            turn.model,
            turn.prompt_template,
            turn.prompt_formatted,
            turn.human_input_raw,
            turn.human_input_corrected,
            turn.llm_output_raw,
            turn.response,
            turn.human_emotion,
            turn.reaction_emotion,
            turn.intent,
            turn.action,
            turn.tool,
            turn.tool_input,
            turn.entities,
            turn.history,
            turn.listening_mode.as_str(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(PersistenceError::DuplicateTurn {
                conversation_id: turn.conversation_id,
                step: turn.step,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Raw row, converted outside the rusqlite callback so conversion errors
/// surface as `PersistenceError::Corrupt`
struct TurnRow {
    turn: Turn,
    timestamp: String,
    listening_mode: String,
}

fn read_turn_row(row: &Row<'_>) -> rusqlite::Result<TurnRow> {
    Ok(TurnRow {
        timestamp: row.get(2)?,
        listening_mode: row.get(18)?,
        turn: Turn {
            conversation_id: row.get(0)?,
            step: row.get(1)?,
            timestamp: DateTime::<Utc>::MIN_UTC,
            model: row.get(3)?,
            prompt_template: row.get(4)?,
            prompt_formatted: row.get(5)?,
            human_input_raw: row.get(6)?,
            human_input_corrected: row.get(7)?,
            llm_output_raw: row.get(8)?,
            response: row.get(9)?,
            human_emotion: row.get(10)?,
            reaction_emotion: row.get(11)?,
            intent: row.get(12)?,
            action: row.get(13)?,
            tool: row.get(14)?,
            tool_input: row.get(15)?,
            entities: row.get(16)?,
            history: row.get(17)?,
            listening_mode: ListeningMode::Active,
        },
    })
}

impl TryFrom<TurnRow> for Turn {
    type Error = PersistenceError;

    fn try_from(row: TurnRow) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| PersistenceError::Corrupt(format!("timestamp '{}': {}", row.timestamp, e)))?
            .with_timezone(&Utc);
        let listening_mode = ListeningMode::from_stored(&row.listening_mode)
            .ok_or_else(|| PersistenceError::Corrupt(format!("listening mode '{}'", row.listening_mode)))?;

        Ok(Turn {
            timestamp,
            listening_mode,
            ..row.turn
        })
    }
}

#[async_trait]
impl TurnStore for SqliteTurnStore {
    async fn insert_turn(&self, turn: &Turn) -> Result<(), PersistenceError> {
        let (conversation_id, step) = (turn.conversation_id, turn.step);
        let turn = turn.clone();
        self.with_conn(move |conn| insert_turn(conn, &turn)).await?;
        tracing::debug!(conversation_id, step, "Turn persisted");
        Ok(())
    }

    async fn insert_chatter(&self, chatter: &Chatter) -> Result<(), PersistenceError> {
        let chatter = chatter.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO chatter (timestamp, human_input_raw, listening_mode) VALUES (?1, ?2, ?3)",
                params![
                    chatter.timestamp.to_rfc3339(),
                    chatter.human_input_raw,
                    chatter.listening_mode.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn max_conversation_id(&self) -> Result<Option<i64>, PersistenceError> {
        self.with_conn(|conn| {
            let max = conn
                .query_row("SELECT MAX(conversation_id) FROM conversation_history", [], |row| {
                    row.get::<_, Option<i64>>(0)
                })
                .optional()?;
            Ok(max.flatten())
        })
        .await
    }

    async fn exchanges(&self, conversation_id: i64) -> Result<Vec<Exchange>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT step, human_input_corrected, ai_response FROM conversation_history \
                 WHERE conversation_id = ?1 ORDER BY step ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id], |row| {
                Ok(Exchange::new(row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn turns(&self, conversation_id: i64) -> Result<Vec<Turn>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM conversation_history WHERE conversation_id = ?1 ORDER BY step ASC",
                TURN_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![conversation_id], read_turn_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(Turn::try_from).collect()
        })
        .await
    }

    async fn chatter_count(&self) -> Result<usize, PersistenceError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM chatter", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
