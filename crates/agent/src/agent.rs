//! Voice buddy turn loop
//!
//! Reads one utterance at a time and routes it through the state machine:
//! passive input is logged, the hotword opens a conversation, the endword
//! closes it, and everything else runs a full turn (history, prompt,
//! model, persist, speak).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use voice_buddy_config::Settings;
use voice_buddy_core::{Chatter, Cue, ListeningMode, SpeechOutput, TranscriptSource, Turn, TurnHeader};
use voice_buddy_llm::{InvokeError, InvokeOutcome, RetryingInvoker};
use voice_buddy_persistence::TurnStore;

use crate::history::HistoryWindow;
use crate::state::{next_conversation_id, ConversationStateMachine, InputDisposition};
use crate::AgentError;

/// Timeouts and flags for the loop
#[derive(Debug, Clone)]
pub struct BuddyConfig {
    /// Persist passive input
    pub log_chatter: bool,
    /// Give up waiting for input, yielding an empty utterance
    pub input_timeout: Option<Duration>,
    pub persistence_timeout: Duration,
    pub output_timeout: Duration,
    /// Number of previous steps included as history
    pub history_steps: usize,
}

impl Default for BuddyConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for BuddyConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            log_chatter: settings.agent.log_chatter,
            input_timeout: settings.input.timeout_secs.map(Duration::from_secs),
            persistence_timeout: Duration::from_secs(settings.persistence.timeout_secs),
            output_timeout: Duration::from_secs(settings.output.timeout_secs),
            history_steps: settings.agent.history_steps,
        }
    }
}

/// Agent events
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Input logged while passive
    Chatter(String),
    /// Conversation opened
    Activated { conversation_id: i64 },
    /// Conversation closed
    Deactivated { conversation_id: i64 },
    /// Model call in progress
    Thinking,
    /// Turn completed
    Response {
        conversation_id: i64,
        step: i64,
        text: String,
    },
    /// Operator asked to record again
    Rerecord,
    /// Turn abandoned after unparseable replies
    ParseFailed { attempts: u32 },
    /// Error
    Error(String),
}

/// Result of handling one utterance
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Nothing to do (empty input)
    Idle,
    /// Logged as passive chatter
    Chatter,
    /// Conversation opened, waiting for the first turn
    Activated { conversation_id: i64 },
    /// Conversation closed
    Deactivated { conversation_id: i64 },
    /// Turn completed and persisted
    Completed(Box<Turn>),
    /// Input discarded, same step again
    Rerecord,
    /// Replies could not be parsed; step not advanced
    Aborted { attempts: u32 },
    /// Input source exhausted
    EndOfInput,
}

/// Conversational voice buddy
pub struct VoiceBuddy {
    config: BuddyConfig,
    state: ConversationStateMachine,
    invoker: RetryingInvoker,
    history: HistoryWindow,
    store: Arc<dyn TurnStore>,
    input: Box<dyn TranscriptSource>,
    output: Box<dyn SpeechOutput>,
    event_tx: broadcast::Sender<AgentEvent>,
}

impl VoiceBuddy {
    pub fn new(
        config: BuddyConfig,
        state: ConversationStateMachine,
        invoker: RetryingInvoker,
        store: Arc<dyn TurnStore>,
        input: Box<dyn TranscriptSource>,
        output: Box<dyn SpeechOutput>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let history = HistoryWindow::new(Arc::clone(&store), config.history_steps);

        Self {
            config,
            state,
            invoker,
            history,
            store,
            input,
            output,
            event_tx,
        }
    }

    /// Subscribe to agent events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> &ConversationStateMachine {
        &self.state
    }

    /// Greeting shown before the loop starts
    pub fn welcome_message(&self) -> String {
        if self.state.requires_hotword() {
            format!(
                "Welcome. You are currently in the inactive mode. Say the hotword '{}' to enter active mode",
                self.state.hotword()
            )
        } else {
            format!("Welcome. Say '{}' to end a conversation", self.state.endword())
        }
    }

    /// Run until the input source is exhausted
    ///
    /// Model transport failures close the conversation and the loop goes on;
    /// other errors end it.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        tracing::info!(input = self.input.name(), output = self.output.name(), "Voice buddy started");
        loop {
            match self.step().await {
                Ok(StepOutcome::EndOfInput) => break,
                Ok(_) => {}
                Err(AgentError::Llm(e)) => {
                    let _ = self.event_tx.send(AgentEvent::Error(e));
                }
                Err(e) => {
                    let _ = self.event_tx.send(AgentEvent::Error(e.to_string()));
                    return Err(e);
                }
            }
        }
        if let Some(session) = self.state.deactivate() {
            tracing::info!(conversation_id = session.conversation_id, "Input ended, conversation closed");
        }
        Ok(())
    }

    /// Read one utterance and handle it
    pub async fn step(&mut self) -> Result<StepOutcome, AgentError> {
        let utterance = match self.config.input_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.input.next_utterance()).await {
                Ok(read) => read?,
                Err(_) => {
                    tracing::debug!(timeout = ?limit, "No input before timeout");
                    Some(String::new())
                }
            },
            None => self.input.next_utterance().await?,
        };

        match utterance {
            Some(text) => self.handle(&text).await,
            None => Ok(StepOutcome::EndOfInput),
        }
    }

    /// Handle one utterance
    pub async fn handle(&mut self, input: &str) -> Result<StepOutcome, AgentError> {
        let timestamp = Utc::now();

        match self.state.classify(input) {
            InputDisposition::Chatter => self.log_chatter(input).await,
            InputDisposition::Activate if self.state.requires_hotword() => {
                self.log_chatter(input).await?;
                let conversation_id = self.open().await?;
                Ok(StepOutcome::Activated { conversation_id })
            }
            InputDisposition::Activate => {
                if input.trim().is_empty() {
                    return Ok(StepOutcome::Idle);
                }
                // No hotword needed: the input that opened the conversation
                // is also its first utterance
                self.open().await?;
                match self.state.classify(input) {
                    InputDisposition::Deactivate => self.close().await,
                    _ => self.converse(input, timestamp).await,
                }
            }
            InputDisposition::Deactivate => {
                tracing::info!("Endword recognized, returning to background mode");
                self.close().await
            }
            InputDisposition::Converse => self.converse(input, timestamp).await,
        }
    }

    async fn log_chatter(&mut self, input: &str) -> Result<StepOutcome, AgentError> {
        if input.trim().is_empty() {
            return Ok(StepOutcome::Idle);
        }
        tracing::info!(chatter = %input, "Background chatter");
        metrics::counter!("voice_buddy_chatter_total").increment(1);
        let _ = self.event_tx.send(AgentEvent::Chatter(input.to_string()));

        if self.config.log_chatter {
            let chatter = Chatter::new(input);
            self.with_store_timeout(self.store.insert_chatter(&chatter)).await?;
        }
        Ok(StepOutcome::Chatter)
    }

    async fn open(&mut self) -> Result<i64, AgentError> {
        let conversation_id = self
            .with_store_timeout(next_conversation_id(self.store.as_ref()))
            .await?;
        self.state.activate(conversation_id);

        tracing::info!(conversation_id, "Conversation started");
        let _ = self.event_tx.send(AgentEvent::Activated { conversation_id });
        self.play_cue(Cue::Activated).await;
        Ok(conversation_id)
    }

    async fn close(&mut self) -> Result<StepOutcome, AgentError> {
        let Some(session) = self.state.deactivate() else {
            return Ok(StepOutcome::Idle);
        };
        let conversation_id = session.conversation_id;

        tracing::info!(
            conversation_id,
            steps = session.step,
            "Conversation ended. Say the hotword '{}' to enter active mode", self.state.hotword()
        );
        let _ = self.event_tx.send(AgentEvent::Deactivated { conversation_id });
        self.play_cue(Cue::Deactivated).await;
        Ok(StepOutcome::Deactivated { conversation_id })
    }

    async fn converse(&mut self, input: &str, timestamp: DateTime<Utc>) -> Result<StepOutcome, AgentError> {
        if input.trim().is_empty() {
            return Ok(StepOutcome::Idle);
        }
        let Some(session) = self.state.session().cloned() else {
            return Ok(StepOutcome::Idle);
        };

        let history = if session.step != 0 {
            let history = self
                .with_store_timeout(self.history.render(session.conversation_id))
                .await?;
            self.state.set_history(history.clone());
            history
        } else {
            session.history.clone()
        };

        let prompt = self.invoker.prompts().baseline(input, &history);
        let _ = self.event_tx.send(AgentEvent::Thinking);

        let invocation = match self.invoker.run(input, &prompt).await {
            Ok(InvokeOutcome::Completed(invocation)) => invocation,
            Ok(InvokeOutcome::Rerecord) => {
                tracing::info!("Re-recording input");
                let _ = self.event_tx.send(AgentEvent::Rerecord);
                return Ok(StepOutcome::Rerecord);
            }
            Ok(InvokeOutcome::Exit) => {
                tracing::info!("Exit requested at confirmation");
                return self.close().await;
            }
            Err(InvokeError::Unparseable { attempts, last_reply, truncated }) => {
                tracing::warn!(
                    conversation_id = session.conversation_id,
                    step = session.step,
                    attempts,
                    truncated,
                    last_reply = %last_reply,
                    "Giving up on this turn, no parseable reply"
                );
                let _ = self.event_tx.send(AgentEvent::ParseFailed { attempts });
                return Ok(StepOutcome::Aborted { attempts });
            }
            Err(InvokeError::Transport(e)) => {
                tracing::error!(
                    conversation_id = session.conversation_id,
                    step = session.step,
                    model = self.invoker.model_name(),
                    error = ?e,
                    "Model call failed, closing conversation"
                );
                self.close().await?;
                return Err(AgentError::Llm(e.to_string()));
            }
            Err(e @ InvokeError::Confirmation(_)) => return Err(AgentError::Input(e.to_string())),
        };

        let header = TurnHeader {
            conversation_id: session.conversation_id,
            step: session.step,
            timestamp,
            model: self.invoker.model_name().to_string(),
            prompt_template: invocation.template.as_str().to_string(),
            prompt_formatted: prompt.text,
            human_input_raw: input.to_string(),
            history,
            listening_mode: ListeningMode::Active,
        };
        let turn = Turn::assemble(header, &invocation.record, invocation.raw_reply);

        self.with_store_timeout(self.store.insert_turn(&turn)).await?;
        self.speak(&turn.response).await;
        self.state.complete_turn();

        metrics::counter!("voice_buddy_turns_total").increment(1);
        tracing::debug!(
            conversation_id = turn.conversation_id,
            step = turn.step,
            attempts = invocation.attempts,
            "Turn completed"
        );
        let _ = self.event_tx.send(AgentEvent::Response {
            conversation_id: turn.conversation_id,
            step: turn.step,
            text: turn.response.clone(),
        });

        Ok(StepOutcome::Completed(Box::new(turn)))
    }

    async fn with_store_timeout<T, E>(
        &self,
        operation: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, AgentError>
    where
        AgentError: From<E>,
    {
        match tokio::time::timeout(self.config.persistence_timeout, operation).await {
            Ok(result) => result.map_err(AgentError::from),
            Err(_) => Err(AgentError::Timeout(format!(
                "persistence did not answer within {:?}",
                self.config.persistence_timeout
            ))),
        }
    }

    async fn speak(&self, text: &str) {
        match tokio::time::timeout(self.config.output_timeout, self.output.speak(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, output = self.output.name(), "Speech output failed"),
            Err(_) => tracing::warn!(timeout = ?self.config.output_timeout, "Speech output timed out"),
        }
    }

    async fn play_cue(&self, cue: Cue) {
        match tokio::time::timeout(self.config.output_timeout, self.output.cue(cue)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, ?cue, "Cue failed"),
            Err(_) => tracing::warn!(?cue, "Cue timed out"),
        }
    }
}
