//! Collaborator traits for the voice buddy
//!
//! The turn loop only talks to the outside world through these traits, so
//! every collaborator can be swapped for a mock in tests.
//!
//! ```text
//! Speech:
//!   - TranscriptSource: one utterance per call (microphone + STT, or text)
//!   - SpeechOutput: speak responses, play mode cues
//!
//! Confirmation:
//!   - ConfirmationGate: proceed / re-record / exit before a model call
//! ```

mod speech;
mod confirm;

pub use speech::{TranscriptSource, SpeechOutput, Cue};
pub use confirm::{ConfirmationGate, GateDecision, AutoConfirm};
