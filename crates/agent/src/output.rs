//! Speech output
//!
//! Responses are always printed. With a `tts_command` configured, the text
//! is also handed to that program as its last argument.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use voice_buddy_config::OutputConfig;
use voice_buddy_core::{Cue, Error, Result, SpeechOutput};

/// Prints responses and cues to the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSpeech;

#[async_trait]
impl SpeechOutput for ConsoleSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        println!("AI: {}", text);
        Ok(())
    }

    async fn cue(&self, cue: Cue) -> Result<()> {
        match cue {
            Cue::Activated => println!("[listening]"),
            Cue::Deactivated => println!("[stopped listening]"),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Speaks through an external text-to-speech program
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
}

impl CommandSpeech {
    /// Split a command line such as `espeak -v en` into program and args
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("output.tts_command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, text: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SpeechOutput for CommandSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        ConsoleSpeech.speak(text).await?;
        if text.trim().is_empty() {
            return Ok(());
        }

        let status = self
            .command(text)
            .status()
            .await
            .map_err(|e| Error::Output(format!("failed to run {}: {}", self.program, e)))?;
        if !status.success() {
            return Err(Error::Output(format!("{} exited with {}", self.program, status)));
        }
        Ok(())
    }

    async fn cue(&self, cue: Cue) -> Result<()> {
        ConsoleSpeech.cue(cue).await
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Build the configured speech output
pub fn create_output(config: &OutputConfig) -> Result<Box<dyn SpeechOutput>> {
    match (&config.tts_command, config.play_sound) {
        (Some(command), true) => {
            let speech = CommandSpeech::parse(command)?;
            tracing::info!(program = speech.program(), "Speaking through external command");
            Ok(Box::new(speech))
        }
        _ => Ok(Box::new(ConsoleSpeech)),
    }
}
