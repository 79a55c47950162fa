//! Speech input and output traits

use async_trait::async_trait;

use crate::Result;

/// Source of human utterances
///
/// Implementations:
/// - `StdinSource` - typed text messages
/// - `TranscriptFileSource` - transcripts written by an external STT process
///
/// # Example
///
/// ```ignore
/// let mut source: Box<dyn TranscriptSource> = Box::new(StdinSource::new(StdinLines::spawn()?));
/// while let Some(text) = source.next_utterance().await? {
///     println!("Heard: {}", text);
/// }
/// ```
#[async_trait]
pub trait TranscriptSource: Send {
    /// Block until the next utterance is available
    ///
    /// Returns `None` once the source is exhausted. The turn loop drops
    /// this future when an input timeout expires, so a pending read must
    /// not consume an utterance it never returns.
    async fn next_utterance(&mut self) -> Result<Option<String>>;

    /// Short name for logging
    fn name(&self) -> &str;
}

/// Audible cues for listening mode changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Entered active mode
    Activated,
    /// Returned to passive mode
    Deactivated,
}

/// Speech output
///
/// Fire-and-forget: implementations may be no-ops when voice output is
/// disabled.
#[async_trait]
pub trait SpeechOutput: Send + Sync + 'static {
    /// Speak a response
    async fn speak(&self, text: &str) -> Result<()>;

    /// Play a mode-change cue
    async fn cue(&self, _cue: Cue) -> Result<()> {
        Ok(())
    }

    /// Name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedSource {
        lines: VecDeque<String>,
    }

    #[async_trait]
    impl TranscriptSource for ScriptedSource {
        async fn next_utterance(&mut self) -> Result<Option<String>> {
            Ok(self.lines.pop_front())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct SilentOutput;

    #[async_trait]
    impl SpeechOutput for SilentOutput {
        async fn speak(&self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    #[tokio::test]
    async fn test_scripted_source_exhausts() {
        let mut source = ScriptedSource {
            lines: VecDeque::from(vec!["hello".to_string()]),
        };
        assert_eq!(source.next_utterance().await.unwrap().as_deref(), Some("hello"));
        assert!(source.next_utterance().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_cue_is_noop() {
        let output = SilentOutput;
        assert!(output.cue(Cue::Activated).await.is_ok());
        assert_eq!(output.name(), "silent");
    }
}
