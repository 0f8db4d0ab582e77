//! Speech output
//!
//! Each enqueued unit resolves exactly once through its oneshot receiver,
//! which is what the session uses to keep its outstanding-unit count.

pub mod command;

use tokio::sync::oneshot;

pub use command::CommandSpeaker;

const SPOKEN_PUNCTUATION: &str = ".,!?;:'\"()[]{}-";

/// How a queued unit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceOutcome {
    /// Spoken to the end (or failed while speaking)
    Finished,
    /// Dropped by `stop_all` before or while speaking
    Cancelled,
}

/// Sequential text-to-speech queue
pub trait SpeechOutput: Send + Sync {
    /// Queue `text` after anything already queued
    fn enqueue(&self, text: &str) -> oneshot::Receiver<UtteranceOutcome>;

    /// Cancel everything queued and cut off the unit being spoken
    fn stop_all(&self);

    /// Whether the synthesizer is producing audio right now
    fn is_busy(&self) -> bool;
}

/// Strip what a synthesizer would read out literally (emoji, markup, symbols)
///
/// Letters, digits and basic punctuation are kept; every other run of
/// characters collapses to a single space.
#[must_use]
pub fn sanitize_for_speech(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_was_space = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() || SPOKEN_PUNCTUATION.contains(ch) {
            out.push(ch);
            previous_was_space = false;
        } else if !previous_was_space {
            out.push(' ');
            previous_was_space = true;
        }
    }

    out.trim().to_owned()
}
