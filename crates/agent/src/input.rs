//! Human input sources
//!
//! - `StdinLines`: one background thread reading the terminal
//! - `StdinSource`: typed messages
//! - `TranscriptFileSource`: one utterance per line, written by an external
//!   speech-to-text process into a file or FIFO
//! - `InputRouter`: switches between voice and text at runtime
//! - `ConsoleConfirm`: asks the operator before a transcript is sent

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::{mpsc, Mutex};

use voice_buddy_config::InputMode;
use voice_buddy_core::{ConfirmationGate, Error, GateDecision, Result, TranscriptSource};

/// Voice utterance that switches to text input
const TEXT_SWITCH: &str = "Text.";
/// Text message that switches back to voice input
const VOICE_SWITCH: &str = "voice";

/// Lines typed on the terminal
///
/// A single thread owns the blocking reader and forwards every line into a
/// channel. Readers share the receiving end, so a read abandoned by a
/// timeout leaves the line queued for the next reader.
#[derive(Clone)]
pub struct StdinLines {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl StdinLines {
    /// Start reading the process stdin
    pub fn spawn() -> Result<Self> {
        Self::from_reader(std::io::BufReader::new(std::io::stdin()))
    }

    /// Start reading any blocking line source
    ///
    /// The thread is detached and ends at EOF, on a read error, or once
    /// every `StdinLines` handle is dropped.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Result<Self> {
        let (tx, rx) = mpsc::channel(16);
        std::thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Reading stdin failed");
                            break;
                        }
                    }
                }
            })?;
        Ok(Self {
            rx: Arc::new(Mutex::new(rx)),
        })
    }

    /// Print `prompt` and wait for the next line, `None` on EOF
    ///
    /// Cancel safe: dropping the future never loses a line.
    pub async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}

/// Typed messages from the terminal
#[derive(Clone)]
pub struct StdinSource {
    lines: StdinLines,
    prompt: String,
}

impl StdinSource {
    pub fn new(lines: StdinLines) -> Self {
        Self {
            lines,
            prompt: "Write a text message: ".to_string(),
        }
    }
}

#[async_trait]
impl TranscriptSource for StdinSource {
    async fn next_utterance(&mut self) -> Result<Option<String>> {
        self.lines.read_line(&self.prompt).await
    }

    fn name(&self) -> &str {
        "stdin"
    }
}

/// Transcripts read line by line
pub struct TranscriptFileSource<R = BufReader<tokio::fs::File>> {
    lines: Lines<R>,
}

impl TranscriptFileSource {
    /// Open a transcript file or FIFO
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::Input(format!("cannot open transcript source {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "Reading transcripts");
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin + Send> TranscriptFileSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self { lines: reader.lines() }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TranscriptSource for TranscriptFileSource<R> {
    async fn next_utterance(&mut self) -> Result<Option<String>> {
        let line = self.lines.next_line().await?;
        Ok(line.map(|l| l.trim().to_string()))
    }

    fn name(&self) -> &str {
        "transcript"
    }
}

/// Routes reads to the voice or text source
///
/// In voice mode an utterance containing `Text.` switches to text for good;
/// in text mode the message `voice` switches back when a voice source
/// exists. The switching utterance itself is not returned.
pub struct InputRouter {
    voice: Option<Box<dyn TranscriptSource>>,
    text: Box<dyn TranscriptSource>,
    mode: InputMode,
}

impl InputRouter {
    pub fn new(
        mode: InputMode,
        voice: Option<Box<dyn TranscriptSource>>,
        text: Box<dyn TranscriptSource>,
    ) -> Self {
        let mode = match (mode, &voice) {
            (InputMode::Voice, None) => {
                tracing::warn!("Voice input requested without a transcript source, using text");
                InputMode::Text
            }
            (mode, _) => mode,
        };
        Self { voice, text, mode }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }
}

#[async_trait]
impl TranscriptSource for InputRouter {
    async fn next_utterance(&mut self) -> Result<Option<String>> {
        loop {
            let voice = match self.mode {
                InputMode::Voice => self.voice.as_mut(),
                InputMode::Text => None,
            };
            if let Some(voice) = voice {
                let Some(utterance) = voice.next_utterance().await? else {
                    return Ok(None);
                };
                if utterance.contains(TEXT_SWITCH) {
                    tracing::info!("Switching to text input");
                    self.mode = InputMode::Text;
                    continue;
                }
                return Ok(Some(utterance));
            }

            let Some(message) = self.text.next_utterance().await? else {
                return Ok(None);
            };
            if message == VOICE_SWITCH {
                if self.voice.is_some() {
                    tracing::info!("Switching to voice input");
                    self.mode = InputMode::Voice;
                } else {
                    tracing::warn!("No voice input configured, staying in text mode");
                }
                continue;
            }
            return Ok(Some(message));
        }
    }

    fn name(&self) -> &str {
        match self.mode {
            InputMode::Voice => "voice",
            InputMode::Text => "text",
        }
    }
}

/// Asks on the terminal whether to send a transcript
///
/// Enter sends, `r` re-records, `e` leaves active mode.
#[derive(Clone)]
pub struct ConsoleConfirm {
    lines: StdinLines,
}

impl ConsoleConfirm {
    pub fn new(lines: StdinLines) -> Self {
        Self { lines }
    }

    pub fn decide(answer: &str) -> GateDecision {
        match answer.trim().to_lowercase().as_str() {
            "r" => GateDecision::Rerecord,
            "e" => GateDecision::Exit,
            _ => GateDecision::Proceed,
        }
    }
}

#[async_trait]
impl ConfirmationGate for ConsoleConfirm {
    async fn confirm(&self, transcript: &str) -> Result<GateDecision> {
        let prompt = format!(
            "Send \"{}\"? [Enter] send, [r] re-record, [e] exit: ",
            transcript
        );
        let answer = self.lines.read_line(&prompt).await?;
        Ok(answer.as_deref().map_or(GateDecision::Exit, Self::decide))
    }
}
