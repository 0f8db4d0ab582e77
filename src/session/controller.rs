use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{AgentClient, AgentError, AgentReply};
use crate::capture::{Capability, CaptureError, SpeechCapture, Transcript};
use crate::config::SessionConfig;
use crate::input::HotkeyEvent;
use crate::present::Presenter;
use crate::session::{
    layout, reveal, ChatMessage, MessageId, Role, SessionEvent, SessionHandle, SessionInbox,
    SessionSnapshot,
};
use crate::speech::{sanitize_for_speech, SpeechOutput, UtteranceOutcome};

const THINKING_PLACEHOLDER: &str = "Thinking…";

/// External pieces the session drives
pub struct Collaborators {
    /// Transcriber
    pub capture: Arc<dyn SpeechCapture>,
    /// Synthesizer
    pub speech: Arc<dyn SpeechOutput>,
    /// Gateway
    pub agent: Arc<dyn AgentClient>,
    /// Overlay
    pub presenter: Box<dyn Presenter>,
}

struct ActiveReveal {
    id: u64,
    message: MessageId,
    task: JoinHandle<()>,
    since_resize: usize,
}

struct IdleDismissal {
    token: u64,
    task: JoinHandle<()>,
}

/// Owner of the push-to-talk session state
///
/// Every mutation happens in [`handle`](Self::handle), called from one task;
/// background work reports back through the [`SessionHandle`].
pub struct SessionController {
    handle: SessionHandle,
    capture: Arc<dyn SpeechCapture>,
    speech: Arc<dyn SpeechOutput>,
    agent: Arc<dyn AgentClient>,
    presenter: Box<dyn Presenter>,
    fallback_send_delay: Duration,
    idle_dismiss_delay: Duration,
    auto_speak: bool,

    is_recording: bool,
    push_to_talk_active: bool,
    did_send_current_utterance: bool,
    utterance: u64,
    transcript: String,
    status: String,

    is_speaking: bool,
    queued_speech_chunks: usize,
    speech_epoch: u64,

    messages: Vec<ChatMessage>,
    next_message_id: u64,
    pending_reply: Option<MessageId>,
    requests_in_flight: usize,

    reveal: Option<ActiveReveal>,
    next_reveal_id: u64,
    idle_dismissal: Option<IdleDismissal>,
    next_idle_token: u64,

    testing_connection: bool,
    connection: String,

    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    /// Build a controller posting its background results through `handle`
    #[must_use]
    pub fn new(
        handle: SessionHandle,
        collaborators: Collaborators,
        config: &SessionConfig,
        auto_speak: bool,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot {
            auto_speak,
            ..SessionSnapshot::default()
        });
        Self {
            handle,
            capture: collaborators.capture,
            speech: collaborators.speech,
            agent: collaborators.agent,
            presenter: collaborators.presenter,
            fallback_send_delay: Duration::from_millis(config.fallback_send_ms),
            idle_dismiss_delay: Duration::from_millis(config.idle_dismiss_ms),
            auto_speak,
            is_recording: false,
            push_to_talk_active: false,
            did_send_current_utterance: false,
            utterance: 0,
            transcript: String::new(),
            status: "Idle".to_owned(),
            is_speaking: false,
            queued_speech_chunks: 0,
            speech_epoch: 0,
            messages: Vec::new(),
            next_message_id: 0,
            pending_reply: None,
            requests_in_flight: 0,
            reveal: None,
            next_reveal_id: 0,
            idle_dismissal: None,
            next_idle_token: 0,
            testing_connection: false,
            connection: "Not tested".to_owned(),
            snapshot,
        }
    }

    /// Watch the menu-bar view of the session
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Consume events until [`SessionEvent::Shutdown`] or every handle is gone
    pub async fn run(mut self, mut inbox: SessionInbox) {
        info!("session loop started");
        while let Some(event) = inbox.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                break;
            }
            self.handle(event);
        }
        self.shutdown();
        info!("session loop stopped");
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Hotkey { event, source } => {
                debug!(event = event.as_str(), source, "hotkey");
                match event {
                    HotkeyEvent::Down => self.start_push_to_talk(),
                    HotkeyEvent::Up => self.stop_push_to_talk(),
                }
            }
            SessionEvent::ToggleRecording => {
                if self.is_recording {
                    self.stop_listening();
                } else {
                    self.start_listening();
                }
            }
            SessionEvent::ShowOverlay => self.show_overlay(),
            SessionEvent::Dismiss => self.dismiss(),
            SessionEvent::SetAutoSpeak(enabled) => {
                info!(enabled, "auto-speak");
                self.auto_speak = enabled;
            }
            SessionEvent::TestConnection => self.test_connection(),
            SessionEvent::Transcript(Transcript::Partial(text)) => {
                debug!(chars = text.chars().count(), "partial transcript");
                self.transcript = text;
                self.refresh_height();
            }
            SessionEvent::Transcript(Transcript::Final(text)) => {
                info!(text = %text, "final transcript");
                self.transcript.clone_from(&text);
                self.send_if_needed(&text);
            }
            SessionEvent::CaptureStarted { utterance } => self.on_capture_started(utterance),
            SessionEvent::CaptureFailed { utterance, reason } => {
                self.on_capture_failed(utterance, &reason);
            }
            SessionEvent::FallbackSend { utterance } => self.on_fallback_send(utterance),
            SessionEvent::Reply { message, result } => self.on_reply(message, result),
            SessionEvent::RevealChar { reveal, ch } => self.on_reveal_char(reveal, ch),
            SessionEvent::RevealFinished { reveal } => self.on_reveal_finished(reveal),
            SessionEvent::SpeechUnitDone { epoch, outcome } => {
                self.on_speech_unit_done(epoch, outcome);
            }
            SessionEvent::IdleDismiss { token } => self.on_idle_dismiss(token),
            SessionEvent::ConnectionChecked(result) => {
                self.testing_connection = false;
                self.connection = match result {
                    Ok(()) => {
                        info!("connection test succeeded");
                        "Connected".to_owned()
                    }
                    Err(e) => {
                        warn!(error = %e, "connection test failed");
                        format!("Connection failed: {e}")
                    }
                };
            }
            SessionEvent::Shutdown => self.shutdown(),
        }
        self.publish();
    }

    // Push-to-talk

    fn start_push_to_talk(&mut self) {
        if self.push_to_talk_active {
            return;
        }
        info!("push-to-talk start");
        self.push_to_talk_active = true;

        if self.is_speaking {
            info!("push-to-talk interrupted speech");
            self.flush_speech();
        }
        self.cancel_reveal();

        if !self.is_recording {
            self.start_listening();
        }
    }

    fn stop_push_to_talk(&mut self) {
        if !self.push_to_talk_active {
            return;
        }
        info!("push-to-talk stop");
        self.push_to_talk_active = false;
        if self.is_recording {
            self.stop_listening();
        }
    }

    // Listening

    fn start_listening(&mut self) {
        self.utterance += 1;
        let utterance = self.utterance;
        info!(utterance, "start listening");

        self.presenter.show();
        self.cancel_idle_dismissal();
        self.transcript.clear();
        "Listening".clone_into(&mut self.status);
        self.is_recording = true;
        self.did_send_current_utterance = false;
        self.refresh_height();

        let capture = Arc::clone(&self.capture);
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let result = match capture.acquire().await {
                Capability::Granted => capture.start().await,
                Capability::Denied(reason) => Err(CaptureError::PermissionDenied(reason)),
            };
            handle.post(match result {
                Ok(()) => SessionEvent::CaptureStarted { utterance },
                Err(e) => SessionEvent::CaptureFailed {
                    utterance,
                    reason: e.to_string(),
                },
            });
        });
    }

    fn stop_listening(&mut self) {
        if !self.is_recording {
            return;
        }
        let utterance = self.utterance;
        info!(utterance, "stop listening");
        self.is_recording = false;
        "Idle".clone_into(&mut self.status);
        self.capture.stop();

        // The final transcript may never come after a caller-driven stop
        let handle = self.handle.clone();
        let delay = self.fallback_send_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.post(SessionEvent::FallbackSend { utterance });
        });

        self.schedule_idle_dismissal();
    }

    fn on_capture_started(&mut self, utterance: u64) {
        if utterance != self.utterance {
            debug!(utterance, "capture start for superseded utterance");
        } else if self.is_recording {
            info!(utterance, "capture running");
        } else {
            info!(utterance, "capture started after listening stopped, stopping again");
            self.capture.stop();
        }
    }

    fn on_capture_failed(&mut self, utterance: u64, reason: &str) {
        if utterance != self.utterance {
            debug!(utterance, reason, "capture failure for superseded utterance");
            return;
        }
        warn!(utterance, reason, "capture failed");
        self.is_recording = false;
        self.status = format!("Mic/STT error: {reason}");
        self.schedule_idle_dismissal();
    }

    fn on_fallback_send(&mut self, utterance: u64) {
        if utterance != self.utterance {
            debug!(utterance, "fallback send for superseded utterance skipped");
            return;
        }
        if self.did_send_current_utterance {
            debug!(utterance, "fallback send skipped (already sent)");
            return;
        }
        let live = self.transcript.trim();
        let candidate = if live.is_empty() {
            self.capture.latest_snapshot().trim().to_owned()
        } else {
            live.to_owned()
        };
        if candidate.is_empty() {
            debug!(utterance, "fallback send skipped (empty transcript)");
            return;
        }
        info!(utterance, text = %candidate, "fallback send");
        self.send_if_needed(&candidate);
    }

    // Sending

    fn send_if_needed(&mut self, text: &str) {
        if self.did_send_current_utterance {
            debug!("send skipped (already sent current utterance)");
            return;
        }
        self.did_send_current_utterance = true;
        self.send(text);
    }

    fn send(&mut self, text: &str) {
        let clean = text.trim();
        if clean.is_empty() {
            debug!("send skipped (empty)");
            self.did_send_current_utterance = false;
            return;
        }
        info!(chars = clean.chars().count(), "send");

        self.presenter.show();
        self.cancel_idle_dismissal();
        self.cancel_reveal();
        "Thinking".clone_into(&mut self.status);

        self.push_message(Role::User, clean.to_owned());
        let placeholder = self.push_message(Role::Assistant, THINKING_PLACEHOLDER.to_owned());
        self.pending_reply = Some(placeholder);
        self.requests_in_flight += 1;
        self.refresh_height();

        let agent = Arc::clone(&self.agent);
        let handle = self.handle.clone();
        let message = clean.to_owned();
        tokio::spawn(async move {
            let result = agent.send(&message).await;
            handle.post(SessionEvent::Reply {
                message: placeholder,
                result,
            });
        });
    }

    fn on_reply(&mut self, message: MessageId, result: Result<AgentReply, AgentError>) {
        self.requests_in_flight = self.requests_in_flight.saturating_sub(1);
        match result {
            Ok(reply) => {
                info!(
                    %message,
                    text = reply.display_text.chars().count(),
                    read = reply.spoken_summary.chars().count(),
                    "reply received"
                );
                self.cancel_reveal();
                if self.auto_speak {
                    self.flush_speech();
                    self.enqueue_speech(&reply.spoken_summary);
                }
                self.start_reveal(message, reply.display_text);
            }
            Err(e) => {
                warn!(%message, error = %e, "agent error");
                let text = format!("Agent error: {e}");
                match self.message_mut(message) {
                    Some(slot) => slot.text = text,
                    None => {
                        self.push_message(Role::Assistant, text);
                    }
                }
                self.clear_pending(message);
                "Error".clone_into(&mut self.status);
                self.refresh_height();
                self.schedule_idle_dismissal();
            }
        }
    }

    // Reveal

    fn start_reveal(&mut self, message: MessageId, text: String) {
        let Some(slot) = self.message_mut(message) else {
            debug!(%message, "placeholder gone, appending reply");
            self.push_message(Role::Assistant, text);
            self.finish_reply(message);
            return;
        };
        slot.text.clear();

        self.next_reveal_id += 1;
        let id = self.next_reveal_id;
        let task = reveal::spawn(id, text, self.handle.clone());
        self.reveal = Some(ActiveReveal {
            id,
            message,
            task,
            since_resize: 0,
        });
    }

    fn on_reveal_char(&mut self, reveal: u64, ch: char) {
        let Some(active) = self.reveal.as_mut().filter(|r| r.id == reveal) else {
            return;
        };
        active.since_resize += 1;
        let resize = active.since_resize >= reveal::RESIZE_EVERY;
        if resize {
            active.since_resize = 0;
        }
        let message = active.message;
        if let Some(slot) = self.message_mut(message) {
            slot.text.push(ch);
        }
        if resize {
            self.refresh_height();
        }
    }

    fn on_reveal_finished(&mut self, reveal: u64) {
        let Some(active) = self.reveal.take_if(|r| r.id == reveal) else {
            return;
        };
        debug!(reveal, "reveal finished");
        self.finish_reply(active.message);
    }

    fn finish_reply(&mut self, message: MessageId) {
        self.clear_pending(message);
        self.refresh_height();
        "Idle".clone_into(&mut self.status);
        self.schedule_idle_dismissal();
    }

    fn cancel_reveal(&mut self) {
        if let Some(active) = self.reveal.take() {
            active.task.abort();
            self.clear_pending(active.message);
            debug!(reveal = active.id, "reveal cancelled");
        }
    }

    // Speech

    fn flush_speech(&mut self) {
        self.speech.stop_all();
        self.queued_speech_chunks = 0;
        self.speech_epoch += 1;
        self.is_speaking = false;
    }

    fn enqueue_speech(&mut self, text: &str) {
        let clean = sanitize_for_speech(text);
        if clean.is_empty() {
            return;
        }
        self.queued_speech_chunks += 1;
        self.is_speaking = true;

        let done = self.speech.enqueue(&clean);
        let epoch = self.speech_epoch;
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let outcome = done.await.unwrap_or(UtteranceOutcome::Cancelled);
            handle.post(SessionEvent::SpeechUnitDone { epoch, outcome });
        });
    }

    fn on_speech_unit_done(&mut self, epoch: u64, outcome: UtteranceOutcome) {
        if epoch == self.speech_epoch {
            self.queued_speech_chunks = self.queued_speech_chunks.saturating_sub(1);
        } else {
            debug!(epoch, "completion from flushed speech epoch");
        }
        self.is_speaking = self.queued_speech_chunks > 0 || self.speech.is_busy();
        debug!(?outcome, queued = self.queued_speech_chunks, "speech unit done");
        if !self.is_speaking {
            self.schedule_idle_dismissal();
        }
    }

    // Overlay

    fn show_overlay(&mut self) {
        self.cancel_idle_dismissal();
        self.refresh_height();
        self.presenter.show();
    }

    fn dismiss(&mut self) {
        info!("dismiss");
        self.flush_speech();
        self.cancel_reveal();
        if self.is_recording {
            self.is_recording = false;
            "Idle".clone_into(&mut self.status);
            self.capture.stop();
            self.push_to_talk_active = false;
        }
        self.cancel_idle_dismissal();
        self.presenter.hide();
    }

    fn schedule_idle_dismissal(&mut self) {
        if !self.is_idle() {
            return;
        }
        self.cancel_idle_dismissal();
        self.next_idle_token += 1;
        let token = self.next_idle_token;
        let handle = self.handle.clone();
        let delay = self.idle_dismiss_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.post(SessionEvent::IdleDismiss { token });
        });
        self.idle_dismissal = Some(IdleDismissal { token, task });
    }

    fn cancel_idle_dismissal(&mut self) {
        if let Some(pending) = self.idle_dismissal.take() {
            pending.task.abort();
        }
    }

    fn on_idle_dismiss(&mut self, token: u64) {
        if self.idle_dismissal.take_if(|d| d.token == token).is_none() {
            return;
        }
        if self.is_idle() {
            debug!("idle auto-dismiss");
            self.presenter.hide();
        }
    }

    fn refresh_height(&mut self) {
        let live = self.live_transcript();
        let texts = self
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .chain(live);
        let height = layout::desired_height(texts);
        self.presenter.update_height(height);
    }

    // Connection test

    fn test_connection(&mut self) {
        if self.testing_connection {
            return;
        }
        info!("testing connection");
        self.testing_connection = true;
        "Testing…".clone_into(&mut self.connection);

        let agent = Arc::clone(&self.agent);
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let result = agent.check_health().await;
            handle.post(SessionEvent::ConnectionChecked(result));
        });
    }

    fn shutdown(&mut self) {
        self.cancel_reveal();
        self.cancel_idle_dismissal();
        if self.is_recording {
            self.is_recording = false;
            self.capture.stop();
        }
        self.speech.stop_all();
    }

    // Helpers

    fn push_message(&mut self, role: Role, text: String) -> MessageId {
        self.next_message_id += 1;
        let id = MessageId::new(self.next_message_id);
        self.messages.push(ChatMessage { id, role, text });
        id
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn clear_pending(&mut self, message: MessageId) {
        if self.pending_reply == Some(message) {
            self.pending_reply = None;
        }
    }

    fn live_transcript(&self) -> Option<&str> {
        let text = self.transcript.trim();
        (self.is_recording && !text.is_empty()).then_some(text)
    }

    const fn is_idle(&self) -> bool {
        !self.is_recording && !self.is_thinking() && !self.is_speaking
    }

    fn publish(&self) {
        let next = SessionSnapshot {
            status: self.status.clone(),
            is_recording: self.is_recording,
            is_thinking: self.is_thinking(),
            is_speaking: self.is_speaking,
            auto_speak: self.auto_speak,
            testing_connection: self.testing_connection,
            connection: self.connection.clone(),
            message_count: self.messages.len(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // Accessors

    /// Capture is (supposed to be) running
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// The hotkey is held
    #[must_use]
    pub const fn push_to_talk_active(&self) -> bool {
        self.push_to_talk_active
    }

    /// A request is in flight or a reply is being revealed
    #[must_use]
    pub const fn is_thinking(&self) -> bool {
        self.requests_in_flight > 0 || self.reveal.is_some()
    }

    /// Speech units are queued or the synthesizer is busy
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Units enqueued in the current flush epoch and not yet finished
    #[must_use]
    pub const fn queued_speech_chunks(&self) -> usize {
        self.queued_speech_chunks
    }

    /// The current utterance was already sent
    #[must_use]
    pub const fn did_send_current_utterance(&self) -> bool {
        self.did_send_current_utterance
    }

    /// Assistant placeholder the current reply goes into
    #[must_use]
    pub const fn pending_reply(&self) -> Option<MessageId> {
        self.pending_reply
    }

    /// Conversation so far
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Status text shown in the menu
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Result of the last connection test
    #[must_use]
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Replies are spoken
    #[must_use]
    pub const fn auto_speak(&self) -> bool {
        self.auto_speak
    }
}
