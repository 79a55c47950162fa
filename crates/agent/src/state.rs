//! Conversation state machine
//!
//! Two listening modes:
//! - Inactive: input is only logged, waiting for the hotword
//! - Active: every input runs a full turn until the endword is heard
//!
//! `classify` is the pure decision function; `activate`, `deactivate` and
//! `complete_turn` apply transitions. Allocating conversation ids and
//! emitting cues is left to the caller.

use voice_buddy_config::AgentConfig;
use voice_buddy_core::ListeningMode;
use voice_buddy_persistence::{PersistenceError, TurnStore};

/// What a piece of input means in the current mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    /// Open a new conversation
    Activate,
    /// Passive input, log it and keep waiting
    Chatter,
    /// Close the active conversation before any model call
    Deactivate,
    /// Run a turn with this input
    Converse,
}

/// Live state of an active conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub conversation_id: i64,
    /// Step of the next turn, starting at 0
    pub step: i64,
    /// History block sent with the last prompt
    pub history: String,
}

impl Session {
    fn new(conversation_id: i64) -> Self {
        Self {
            conversation_id,
            step: 0,
            history: String::new(),
        }
    }
}

/// Hotword/endword driven turn-taking
#[derive(Debug, Clone)]
pub struct ConversationStateMachine {
    hotword: String,
    endword: String,
    start_inactive: bool,
    session: Option<Session>,
}

impl ConversationStateMachine {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            hotword: config.hotword.trim().to_lowercase(),
            endword: config.endword.trim().to_lowercase(),
            start_inactive: config.start_inactive,
            session: None,
        }
    }

    pub fn mode(&self) -> ListeningMode {
        if self.session.is_some() {
            ListeningMode::Active
        } else {
            ListeningMode::Inactive
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether the hotword is needed to open a conversation
    pub fn requires_hotword(&self) -> bool {
        self.start_inactive
    }

    pub fn hotword(&self) -> &str {
        &self.hotword
    }

    pub fn endword(&self) -> &str {
        &self.endword
    }

    /// Decide what the input means, without changing state
    ///
    /// Matching is case-insensitive substring containment.
    pub fn classify(&self, input: &str) -> InputDisposition {
        let input = input.to_lowercase();
        match self.mode() {
            ListeningMode::Inactive => {
                if !self.start_inactive || input.contains(&self.hotword) {
                    InputDisposition::Activate
                } else {
                    InputDisposition::Chatter
                }
            }
            ListeningMode::Active => {
                if input.contains(&self.endword) {
                    InputDisposition::Deactivate
                } else {
                    InputDisposition::Converse
                }
            }
        }
    }

    /// Enter active mode with a freshly allocated conversation id
    pub fn activate(&mut self, conversation_id: i64) -> &Session {
        if let Some(previous) = &self.session {
            tracing::warn!(
                previous = previous.conversation_id,
                conversation_id,
                "Activating while a conversation is open, replacing it"
            );
        }
        self.session.insert(Session::new(conversation_id))
    }

    /// Return to inactive mode, handing back the closed session
    pub fn deactivate(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Remember the history block sent with the current prompt
    pub fn set_history(&mut self, history: String) {
        if let Some(session) = self.session.as_mut() {
            session.history = history;
        }
    }

    /// Advance to the next step; returns the new step
    pub fn complete_turn(&mut self) -> Option<i64> {
        self.session.as_mut().map(|session| {
            session.step += 1;
            session.step
        })
    }
}

/// Next conversation id: highest stored id + 1, or 1 for an empty store
pub async fn next_conversation_id(store: &dyn TurnStore) -> Result<i64, PersistenceError> {
    Ok(store.max_conversation_id().await?.map_or(1, |max| max + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_buddy_core::{Turn, TurnHeader, ParsedRecord};
    use voice_buddy_persistence::InMemoryTurnStore;

    fn passive_machine() -> ConversationStateMachine {
        ConversationStateMachine::new(&AgentConfig {
            start_inactive: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_hotword_activates() {
        let machine = passive_machine();
        assert_eq!(machine.mode(), ListeningMode::Inactive);
        assert_eq!(machine.classify("please ACTIVATE now"), InputDisposition::Activate);
        assert_eq!(machine.classify("just chatting"), InputDisposition::Chatter);
    }

    #[test]
    fn test_activation_resets_session() {
        let mut machine = passive_machine();
        let session = machine.activate(8);
        assert_eq!(session.conversation_id, 8);
        assert_eq!(session.step, 0);
        assert!(session.history.is_empty());
        assert_eq!(machine.mode(), ListeningMode::Active);
    }

    #[test]
    fn test_endword_deactivates() {
        let mut machine = passive_machine();
        machine.activate(1);
        for _ in 0..5 {
            machine.complete_turn();
        }
        assert_eq!(machine.session().map(|s| s.step), Some(5));

        assert_eq!(machine.classify("time to exit"), InputDisposition::Deactivate);
        assert_eq!(machine.classify("tell me a joke"), InputDisposition::Converse);

        let closed = machine.deactivate().unwrap();
        assert_eq!(closed.step, 5);
        assert_eq!(machine.mode(), ListeningMode::Inactive);
    }

    #[test]
    fn test_hotword_not_required_when_starting_active() {
        let machine = ConversationStateMachine::new(&AgentConfig::default());
        assert!(!machine.requires_hotword());
        assert_eq!(machine.classify("hello"), InputDisposition::Activate);
    }

    #[test]
    fn test_complete_turn_outside_session() {
        let mut machine = passive_machine();
        assert_eq!(machine.complete_turn(), None);
        machine.set_history("ignored".to_string());
        assert!(machine.session().is_none());
    }

    #[tokio::test]
    async fn test_next_conversation_id() {
        let store = InMemoryTurnStore::new();
        assert_eq!(next_conversation_id(&store).await.unwrap(), 1);

        let header = TurnHeader {
            conversation_id: 41,
            step: 0,
            timestamp: chrono::Utc::now(),
            model: "m".to_string(),
            prompt_template: "baseline".to_string(),
            prompt_formatted: String::new(),
            human_input_raw: "hi".to_string(),
            history: String::new(),
            listening_mode: ListeningMode::Active,
        };
        let turn = Turn::assemble(header, &ParsedRecord::default(), "response: NA\n}");
        store.insert_turn(&turn).await.unwrap();

        assert_eq!(next_conversation_id(&store).await.unwrap(), 42);
    }
}
