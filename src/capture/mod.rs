//! Speech capture
//!
//! Streaming transcription that reports partial results while the user holds
//! the hotkey and at most one final result per utterance.

pub mod command;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use command::CommandCapture;

/// Result of the single permission/availability check before capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Capture may start
    Granted,
    /// Capture cannot start; the reason is user-facing
    Denied(String),
}

/// Capture start failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Microphone, speech recognition or transcriber access refused
    #[error("{0}")]
    PermissionDenied(String),

    /// Transcriber could not be started
    #[error("Capture engine failed to start: {0}")]
    EngineStart(String),
}

/// Text produced by the transcriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// Best guess so far; replaced by the next one
    Partial(String),
    /// Last result for the utterance
    Final(String),
}

/// Receives transcripts from the capture backend
pub type TranscriptSink = Arc<dyn Fn(Transcript) + Send + Sync>;

/// Streaming speech capture
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Check (and if needed prompt for) everything capture needs
    async fn acquire(&self) -> Capability;

    /// Begin streaming a new utterance
    ///
    /// # Errors
    /// Returns error if the capture engine cannot be started
    async fn start(&self) -> Result<(), CaptureError>;

    /// Stop feeding audio; a final transcript may still arrive afterwards
    fn stop(&self);

    /// Last non-empty transcript of the current utterance
    fn latest_snapshot(&self) -> String;
}
