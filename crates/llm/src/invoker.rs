//! Bounded model invocation
//!
//! Sends a prompt, parses the reply and retries unparseable replies up to a
//! configured number of attempts. Generation timeouts count as failed
//! attempts; any other backend error ends the invocation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use voice_buddy_config::{LlmConfig, ParseRecovery};
use voice_buddy_core::{AutoConfirm, ConfirmationGate, GateDecision, ParsedRecord};

use crate::backend::{BackendConfig, LlmBackend};
use crate::parser::SchemaParser;
use crate::prompt::{Prompt, PromptBuilder, PromptTemplate};
use crate::LlmError;

/// Invocation failures
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Reply could not be parsed after {attempts} attempts")]
    Unparseable {
        attempts: u32,
        last_reply: String,
        /// The last reply stopped at the token limit
        truncated: bool,
    },

    #[error("Model transport failed: {0}")]
    Transport(#[from] LlmError),

    #[error("Confirmation failed: {0}")]
    Confirmation(String),
}

impl From<InvokeError> for voice_buddy_core::Error {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Unparseable { .. } => voice_buddy_core::Error::Parse(err.to_string()),
            other => voice_buddy_core::Error::Llm(other.to_string()),
        }
    }
}

/// Invoker configuration
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Total generations allowed, at least 1
    pub max_attempts: u32,
    /// Timeout for a single generation, backend retries included
    pub generation_timeout: Duration,
    pub recovery: ParseRecovery,
    /// Consult the confirmation gate before invoking
    pub confirm_send: bool,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for InvokerConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            generation_timeout: BackendConfig::from(config).retry_budget(),
            recovery: config.parse_recovery,
            confirm_send: false,
        }
    }
}

/// A successfully parsed reply
#[derive(Debug, Clone)]
pub struct Invocation {
    pub record: ParsedRecord,
    pub raw_reply: String,
    /// Generations used, including the successful one
    pub attempts: u32,
    /// Template of the prompt that produced the reply
    pub template: PromptTemplate,
}

/// Result of a gated invocation
#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    Completed(Invocation),
    /// Operator asked to record the input again
    Rerecord,
    /// Operator asked to leave active mode
    Exit,
}

/// Calls the model until a reply parses or attempts run out
pub struct RetryingInvoker {
    backend: Arc<dyn LlmBackend>,
    prompts: PromptBuilder,
    parser: SchemaParser,
    gate: Arc<dyn ConfirmationGate>,
    config: InvokerConfig,
}

impl RetryingInvoker {
    pub fn new(backend: Arc<dyn LlmBackend>, prompts: PromptBuilder, config: InvokerConfig) -> Self {
        Self {
            backend,
            prompts,
            parser: SchemaParser::new(),
            gate: Arc::new(AutoConfirm),
            config: InvokerConfig {
                max_attempts: config.max_attempts.max(1),
                ..config
            },
        }
    }

    /// Use a confirmation gate
    pub fn with_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Ask the gate whether the transcript may be sent
    pub async fn gate(&self, transcript: &str) -> Result<GateDecision, InvokeError> {
        if !self.config.confirm_send {
            return Ok(GateDecision::Proceed);
        }
        self.gate
            .confirm(transcript)
            .await
            .map_err(|e| InvokeError::Confirmation(e.to_string()))
    }

    /// Gate the transcript, then invoke
    pub async fn run(&self, transcript: &str, prompt: &Prompt) -> Result<InvokeOutcome, InvokeError> {
        match self.gate(transcript).await? {
            GateDecision::Proceed => self.invoke(prompt).await.map(InvokeOutcome::Completed),
            GateDecision::Rerecord => Ok(InvokeOutcome::Rerecord),
            GateDecision::Exit => Ok(InvokeOutcome::Exit),
        }
    }

    /// Generate and parse, retrying unparseable replies
    pub async fn invoke(&self, prompt: &Prompt) -> Result<Invocation, InvokeError> {
        let max = self.config.max_attempts;
        let mut last_reply = String::new();
        let mut truncated = false;

        for attempt in 1..=max {
            let current = match self.config.recovery {
                ParseRecovery::Repair if attempt > 1 && !last_reply.is_empty() => {
                    self.prompts.repair(&last_reply)
                }
                _ => prompt.clone(),
            };

            let start = Instant::now();
            let generated = tokio::time::timeout(
                self.config.generation_timeout,
                self.backend.generate(&current.messages()),
            )
            .await;

            let result = match generated {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, attempt, model = self.backend.model_name(), "LLM generation failed");
                    return Err(InvokeError::Transport(e));
                }
                Err(_) => {
                    tracing::warn!(
                        timeout = ?self.config.generation_timeout,
                        "Generation timed out, attempt {}/{}", attempt, max
                    );
                    metrics::counter!("voice_buddy_parse_failures_total", "reason" => "timeout").increment(1);
                    continue;
                }
            };
            metrics::histogram!("voice_buddy_llm_latency_ms").record(start.elapsed().as_millis() as f64);
            tracing::debug!(
                attempt,
                tokens = result.tokens,
                backend_ms = result.total_time_ms,
                finish_reason = ?result.finish_reason,
                "Generation finished"
            );

            match self.parser.parse(&result.text) {
                Ok(record) => {
                    tracing::debug!(attempt, template = %current.template, "Reply parsed");
                    return Ok(Invocation {
                        record,
                        raw_reply: result.text,
                        attempts: attempt,
                        template: current.template,
                    });
                }
                Err(e) => {
                    truncated = result.truncated();
                    if truncated {
                        tracing::warn!(
                            tokens = result.tokens,
                            "Reply stopped at the token limit, consider raising llm.max_tokens"
                        );
                    }
                    tracing::warn!(
                        error = %e,
                        raw_reply = %result.text,
                        "Reply parsing failed, attempt {}/{}", attempt, max
                    );
                    let reason = if truncated { "truncated" } else { "unparseable" };
                    metrics::counter!("voice_buddy_parse_failures_total", "reason" => reason).increment(1);
                    last_reply = result.text;
                }
            }
        }

        Err(InvokeError::Unparseable {
            attempts: max,
            last_reply,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FinishReason, GenerationResult};
    use crate::prompt::Message;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use voice_buddy_config::AgentConfig;

    enum Scripted {
        Reply(&'static str),
        Truncated(&'static str),
        Fail,
        Hang,
    }

    struct MockBackend {
        script: Mutex<Vec<Scripted>>,
        seen: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn new(mut script: Vec<Scripted>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
            self.seen.lock().push(messages[0].content.clone());
            let next = self.script.lock().pop();
            match next {
                Some(Scripted::Reply(text)) => Ok(GenerationResult::text(text)),
                Some(Scripted::Truncated(text)) => Ok(GenerationResult {
                    text: text.to_string(),
                    tokens: 300,
                    total_time_ms: 5,
                    finish_reason: FinishReason::Length,
                }),
                Some(Scripted::Fail) => Err(LlmError::Api("HTTP 401: unauthorized".to_string())),
                Some(Scripted::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(GenerationResult::text("too late"))
                }
                None => Ok(GenerationResult::text("still nothing useful")),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    struct FixedGate(GateDecision);

    #[async_trait]
    impl ConfirmationGate for FixedGate {
        async fn confirm(&self, _transcript: &str) -> voice_buddy_core::Result<GateDecision> {
            Ok(self.0)
        }
    }

    fn invoker(backend: Arc<MockBackend>, max_attempts: u32, recovery: ParseRecovery) -> RetryingInvoker {
        let config = InvokerConfig {
            max_attempts,
            generation_timeout: Duration::from_millis(50),
            recovery,
            confirm_send: false,
        };
        RetryingInvoker::new(backend, PromptBuilder::new(&AgentConfig::default()), config)
    }

    fn prompt() -> Prompt {
        PromptBuilder::new(&AgentConfig::default()).baseline("hello", "")
    }

    #[tokio::test]
    async fn test_first_reply_parses() {
        let backend = MockBackend::new(vec![Scripted::Reply("response: Hi!\n}")]);
        let invocation = invoker(backend.clone(), 3, ParseRecovery::Regenerate)
            .invoke(&prompt())
            .await
            .unwrap();

        assert_eq!(invocation.record.response, "Hi!");
        assert_eq!(invocation.attempts, 1);
        assert_eq!(invocation.template, PromptTemplate::Baseline);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_parseable() {
        let backend = MockBackend::new(vec![
            Scripted::Reply("Sure thing!"),
            Scripted::Reply("response: Second time lucky\n}"),
        ]);
        let invocation = invoker(backend.clone(), 3, ParseRecovery::Regenerate)
            .invoke(&prompt())
            .await
            .unwrap();

        assert_eq!(invocation.attempts, 2);
        assert_eq!(invocation.raw_reply, "response: Second time lucky\n}");
        let seen = backend.seen.lock();
        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let backend = MockBackend::new(vec![]);
        let result = invoker(backend.clone(), 3, ParseRecovery::Regenerate)
            .invoke(&prompt())
            .await;

        match result {
            Err(InvokeError::Unparseable { attempts, last_reply, truncated }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_reply, "still nothing useful");
                assert!(!truncated);
            }
            other => panic!("expected unparseable, got {:?}", other),
        }
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_fast() {
        let backend = MockBackend::new(vec![]);
        let config = LlmConfig {
            max_parse_retries: 0,
            ..Default::default()
        };
        let invoker = RetryingInvoker::new(
            backend.clone(),
            PromptBuilder::new(&AgentConfig::default()),
            InvokerConfig::from(&config),
        );

        assert!(matches!(
            invoker.invoke(&prompt()).await,
            Err(InvokeError::Unparseable { attempts: 1, .. })
        ));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_truncated_reply_reported() {
        let backend = MockBackend::new(vec![
            Scripted::Truncated("{\n\"human_input\": \"tell me a long story\",\n\"intent\": \"story"),
        ]);
        let result = invoker(backend.clone(), 1, ParseRecovery::Regenerate)
            .invoke(&prompt())
            .await;

        match result {
            Err(InvokeError::Unparseable { attempts: 1, truncated, .. }) => assert!(truncated),
            other => panic!("expected unparseable, got {:?}", other),
        }
    }

    #[test]
    fn test_generation_timeout_covers_backend_retries() {
        let llm = LlmConfig::default();
        let config = InvokerConfig::from(&llm);
        assert!(config.generation_timeout > Duration::from_secs(llm.timeout_secs));
        assert_eq!(config.generation_timeout, BackendConfig::from(&llm).retry_budget());
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let backend = MockBackend::new(vec![Scripted::Fail, Scripted::Reply("response: hi\n}")]);
        let result = invoker(backend.clone(), 3, ParseRecovery::Regenerate)
            .invoke(&prompt())
            .await;

        assert!(matches!(result, Err(InvokeError::Transport(LlmError::Api(_)))));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_attempt() {
        let backend = MockBackend::new(vec![Scripted::Hang, Scripted::Reply("response: back\n}")]);
        let invocation = invoker(backend.clone(), 2, ParseRecovery::Regenerate)
            .invoke(&prompt())
            .await
            .unwrap();

        assert_eq!(invocation.attempts, 2);
        assert_eq!(invocation.record.response, "back");
    }

    #[tokio::test]
    async fn test_repair_prompt_embeds_previous_reply() {
        let backend = MockBackend::new(vec![
            Scripted::Reply("I would say hello"),
            Scripted::Reply("response: hello\n}"),
        ]);
        let invocation = invoker(backend.clone(), 2, ParseRecovery::Repair)
            .invoke(&prompt())
            .await
            .unwrap();

        assert_eq!(invocation.template, PromptTemplate::Repair);
        let seen = backend.seen.lock();
        assert!(seen[1].starts_with("You have to fix an AI generated chatbot answer"));
        assert!(seen[1].contains("I would say hello"));
    }

    #[tokio::test]
    async fn test_gate_decisions() {
        for (decision, expect_call) in [
            (GateDecision::Rerecord, false),
            (GateDecision::Exit, false),
            (GateDecision::Proceed, true),
        ] {
            let backend = MockBackend::new(vec![Scripted::Reply("response: ok\n}")]);
            let mut invoker = invoker(backend.clone(), 1, ParseRecovery::Regenerate)
                .with_gate(Arc::new(FixedGate(decision)));
            invoker.config.confirm_send = true;

            let outcome = invoker.run("hello", &prompt()).await.unwrap();
            match (decision, outcome) {
                (GateDecision::Rerecord, InvokeOutcome::Rerecord) => {}
                (GateDecision::Exit, InvokeOutcome::Exit) => {}
                (GateDecision::Proceed, InvokeOutcome::Completed(inv)) => assert_eq!(inv.record.response, "ok"),
                (d, o) => panic!("decision {:?} gave {:?}", d, o),
            }
            assert_eq!(backend.calls() == 1, expect_call);
        }
    }

    #[tokio::test]
    async fn test_gate_skipped_without_confirmation() {
        let backend = MockBackend::new(vec![Scripted::Reply("response: ok\n}")]);
        let invoker = invoker(backend.clone(), 1, ParseRecovery::Regenerate)
            .with_gate(Arc::new(FixedGate(GateDecision::Exit)));

        let outcome = invoker.run("hello", &prompt()).await.unwrap();
        assert!(matches!(outcome, InvokeOutcome::Completed(_)));
    }
}
