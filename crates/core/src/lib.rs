//! Core traits and types for the voice buddy
//!
//! This crate provides foundational types used across all other crates:
//! - The fixed reply schema (`SchemaKey`, `ParsedRecord`)
//! - Persisted conversation types (`Turn`, `Chatter`, `Exchange`)
//! - Listening modes for the turn-taking state machine
//! - Collaborator traits for input, speech output and confirmation
//! - Error types

pub mod error;
pub mod schema;
pub mod conversation;
pub mod traits;

pub use error::{Error, Result};
pub use schema::{SchemaKey, ParsedRecord, RecordDraft};
pub use conversation::{Turn, TurnHeader, Chatter, Exchange, ListeningMode};

// Trait re-exports
pub use traits::{
    // Speech
    TranscriptSource, SpeechOutput, Cue,
    // Confirmation
    ConfirmationGate, GateDecision, AutoConfirm,
};
