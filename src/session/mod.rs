//! Push-to-talk session: the single event loop that owns all session state.
//!
//! Hotkey backends, the capture transcriber, speech completions, the agent
//! round-trip and every timer post [`SessionEvent`]s through a
//! [`SessionHandle`]; [`SessionController`] applies them one at a time.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::agent::{AgentError, AgentReply};
use crate::capture::{Transcript, TranscriptSink};
use crate::input::{HotkeyEvent, HotkeySink};
use crate::speech::UtteranceOutcome;

pub mod controller;
pub mod layout;
pub mod reveal;

pub use controller::{Collaborators, SessionController};

/// Stable identity of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Transcribed speech sent to the agent
    User,
    /// Agent reply or inline error
    Assistant,
}

/// One entry of the conversation; text changes while a reply is revealed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Allocated by the controller, never reused
    pub id: MessageId,
    /// Author
    pub role: Role,
    /// Current text (grows during a reveal)
    pub text: String,
}

/// What the menu bar shows about the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Short status text ("Idle", "Listening", "Thinking", errors)
    pub status: String,
    /// Capture is running
    pub is_recording: bool,
    /// A request is in flight or a reply is being revealed
    pub is_thinking: bool,
    /// Speech output is queued or playing
    pub is_speaking: bool,
    /// Replies are spoken
    pub auto_speak: bool,
    /// A health check is in flight
    pub testing_connection: bool,
    /// Result of the last health check
    pub connection: String,
    /// Messages in the conversation
    pub message_count: usize,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: "Idle".to_owned(),
            is_recording: false,
            is_thinking: false,
            is_speaking: false,
            auto_speak: true,
            testing_connection: false,
            connection: "Not tested".to_owned(),
            message_count: 0,
        }
    }
}

/// Everything the session loop reacts to
#[derive(Debug)]
pub enum SessionEvent {
    /// Push-to-talk edge from the active backend
    Hotkey {
        /// Edge
        event: HotkeyEvent,
        /// Backend that saw it
        source: &'static str,
    },
    /// Menu: start or stop listening
    ToggleRecording,
    /// Menu: bring the overlay up
    ShowOverlay,
    /// Stop everything and hide the overlay
    Dismiss,
    /// Menu: speak replies or not
    SetAutoSpeak(bool),
    /// Menu: check gateway health
    TestConnection,
    /// Output from the transcriber
    Transcript(Transcript),
    /// Capture for `utterance` is running
    CaptureStarted {
        /// Utterance number the start belongs to
        utterance: u64,
    },
    /// Capture for `utterance` could not start
    CaptureFailed {
        /// Utterance number the start belongs to
        utterance: u64,
        /// Permission or engine failure text
        reason: String,
    },
    /// Fallback timer armed when listening stopped
    FallbackSend {
        /// Utterance whose listening stopped
        utterance: u64,
    },
    /// Agent round-trip for the placeholder `message` finished
    Reply {
        /// Placeholder the reply belongs in
        message: MessageId,
        /// Normalized reply or failure
        result: Result<AgentReply, AgentError>,
    },
    /// Next character of reveal `reveal`
    RevealChar {
        /// Reveal the character belongs to
        reveal: u64,
        /// Character to append
        ch: char,
    },
    /// Reveal `reveal` emitted its last character
    RevealFinished {
        /// Reveal that completed
        reveal: u64,
    },
    /// A speech unit queued during flush epoch `epoch` ended
    SpeechUnitDone {
        /// Flush epoch current when the unit was enqueued
        epoch: u64,
        /// Played to the end or cut off
        outcome: UtteranceOutcome,
    },
    /// Idle auto-dismiss timer `token` fired
    IdleDismiss {
        /// Token of the schedule that fired
        token: u64,
    },
    /// Health check finished
    ConnectionChecked(Result<(), AgentError>),
    /// Stop the loop
    Shutdown,
}

/// Receiving end consumed by [`SessionController::run`]
pub type SessionInbox = mpsc::UnboundedReceiver<SessionEvent>;

/// Cloneable sender into the session loop
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Create a handle and the inbox it feeds
    #[must_use]
    pub fn channel() -> (Self, SessionInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Post an event; dropped silently once the loop has stopped
    pub fn post(&self, event: SessionEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(event = ?e.0, "session loop gone, event dropped");
        }
    }

    /// Sink handed to hotkey backends
    #[must_use]
    pub fn hotkey_sink(&self) -> HotkeySink {
        let handle = self.clone();
        Arc::new(move |event, source| handle.post(SessionEvent::Hotkey { event, source }))
    }

    /// Sink handed to the capture backend
    #[must_use]
    pub fn transcript_sink(&self) -> TranscriptSink {
        let handle = self.clone();
        Arc::new(move |transcript| handle.post(SessionEvent::Transcript(transcript)))
    }
}
