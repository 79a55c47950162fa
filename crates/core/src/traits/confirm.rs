//! Confirmation gate consulted before a transcript is sent to the model

use async_trait::async_trait;

use crate::Result;

/// Operator decision about a transcribed input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Send the input to the model
    Proceed,
    /// Discard the input and record it again
    Rerecord,
    /// Leave active mode
    Exit,
}

/// Decides whether a transcript should be sent to the model
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, transcript: &str) -> Result<GateDecision>;
}

/// Gate that always proceeds
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn confirm(&self, _transcript: &str) -> Result<GateDecision> {
        Ok(GateDecision::Proceed)
    }
}
