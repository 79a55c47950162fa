//! Input and output configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Human input medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Transcribed speech from an external STT process
    Voice,
    /// Typed messages
    #[default]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputConfig {
    /// Initial input medium
    #[serde(default)]
    pub mode: InputMode,

    /// File or FIFO the STT process writes one utterance per line into
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,

    /// Give up waiting for an utterance after this long (no limit if unset)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Speak responses aloud
    #[serde(default = "default_true")]
    pub play_sound: bool,

    /// Program invoked with the response text as its last argument
    #[serde(default)]
    pub tts_command: Option<String>,

    #[serde(default = "default_output_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_output_timeout() -> u64 {
    30
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            play_sound: true,
            tts_command: None,
            timeout_secs: default_output_timeout(),
        }
    }
}
