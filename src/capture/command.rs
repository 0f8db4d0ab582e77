//! Capture through an external streaming transcriber.
//!
//! The transcriber records from the microphone itself and prints one line per
//! result on stdout:
//!
//! ```text
//! partial\thello
//! partial\thello wor
//! final\thello world
//! ```
//!
//! Lines without a tag count as partial results. Closing the transcriber's
//! stdin tells it the utterance is over.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::capture::{Capability, CaptureError, SpeechCapture, Transcript, TranscriptSink};
use crate::config::CaptureConfig;

/// Parse one transcriber output line
#[must_use]
pub fn parse_line(line: &str) -> Option<Transcript> {
    if let Some(text) = line.strip_prefix("final\t") {
        return Some(Transcript::Final(text.trim().to_owned()));
    }
    let text = line.strip_prefix("partial\t").unwrap_or(line).trim();
    if text.is_empty() {
        None
    } else {
        Some(Transcript::Partial(text.to_owned()))
    }
}

/// Shared between the capture handle and the stdout reader
struct Shared {
    generation: AtomicU64,
    snapshot: Mutex<String>,
    stdin: Mutex<Option<ChildStdin>>,
    sink: TranscriptSink,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn snapshot(&self) -> String {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close_stdin(&self) -> bool {
        self.stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }
}

/// [`SpeechCapture`] backed by a transcriber child process
pub struct CommandCapture {
    command: String,
    args: Vec<String>,
    shared: Arc<Shared>,
}

impl CommandCapture {
    /// Create a capture that reports transcripts to `sink`
    #[must_use]
    pub fn new(config: &CaptureConfig, sink: TranscriptSink) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                snapshot: Mutex::new(String::new()),
                stdin: Mutex::new(None),
                sink,
            }),
        }
    }
}

#[async_trait]
impl SpeechCapture for CommandCapture {
    async fn acquire(&self) -> Capability {
        match which::which(&self.command) {
            Ok(path) => {
                debug!(path = %path.display(), "transcriber found");
                Capability::Granted
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "transcriber not found");
                Capability::Denied(format!(
                    "Transcriber '{}' not found on PATH",
                    self.command
                ))
            }
        }
    }

    async fn start(&self) -> Result<(), CaptureError> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.shared.close_stdin();

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::EngineStart(format!("{}: {e}", self.command)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::EngineStart("transcriber stdout unavailable".to_owned()))?;
        *self
            .shared
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = child.stdin.take();

        info!(generation, command = %self.command, "transcriber started");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut delivered_final = false;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "transcriber stdout read failed");
                        break;
                    }
                };
                if !shared.is_current(generation) {
                    debug!(generation, "dropping output from superseded transcriber");
                    continue;
                }
                match parse_line(&line) {
                    Some(Transcript::Partial(text)) => {
                        *shared.snapshot.lock().unwrap_or_else(PoisonError::into_inner) =
                            text.clone();
                        (shared.sink)(Transcript::Partial(text));
                    }
                    Some(Transcript::Final(text)) => {
                        if delivered_final {
                            debug!("ignoring extra final transcript");
                            continue;
                        }
                        delivered_final = true;
                        shared.close_stdin();
                        let text = if text.is_empty() {
                            shared.snapshot()
                        } else {
                            *shared.snapshot.lock().unwrap_or_else(PoisonError::into_inner) =
                                text.clone();
                            text
                        };
                        info!(chars = text.chars().count(), "final transcription emitted");
                        (shared.sink)(Transcript::Final(text));
                    }
                    None => {}
                }
            }

            match child.wait().await {
                Ok(status) => debug!(generation, %status, "transcriber exited"),
                Err(e) => warn!(generation, error = %e, "failed to reap transcriber"),
            }
        });

        Ok(())
    }

    fn stop(&self) {
        if self.shared.close_stdin() {
            info!("transcriber input closed");
        }
    }

    fn latest_snapshot(&self) -> String {
        self.shared.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_tagged_lines() {
        assert_eq!(
            parse_line("partial\thello wor"),
            Some(Transcript::Partial("hello wor".to_owned()))
        );
        assert_eq!(
            parse_line("final\t hello world "),
            Some(Transcript::Final("hello world".to_owned()))
        );
        assert_eq!(parse_line("final\t"), Some(Transcript::Final(String::new())));
    }

    #[test]
    fn test_parse_untagged_line_is_partial() {
        assert_eq!(
            parse_line("  just words "),
            Some(Transcript::Partial("just words".to_owned()))
        );
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("partial\t  "), None);
    }

    fn recording_sink() -> (TranscriptSink, Arc<Mutex<Vec<Transcript>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: TranscriptSink = Arc::new(move |t| seen_clone.lock().unwrap().push(t));
        (sink, seen)
    }

    fn shell(script: &str) -> CaptureConfig {
        CaptureConfig {
            command: "sh".to_owned(),
            args: vec!["-c".to_owned(), script.to_owned()],
        }
    }

    async fn wait_for_final(seen: &Arc<Mutex<Vec<Transcript>>>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if seen
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|t| matches!(t, Transcript::Final(_)))
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_final_falls_back_to_snapshot() {
        let (sink, seen) = recording_sink();
        let capture = CommandCapture::new(
            &shell(r"printf 'partial\thel\npartial\thello\nfinal\t\n'"),
            sink,
        );
        assert_eq!(capture.acquire().await, Capability::Granted);
        capture.start().await.unwrap();
        wait_for_final(&seen).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Transcript::Partial("hel".to_owned()),
                Transcript::Partial("hello".to_owned()),
                Transcript::Final("hello".to_owned()),
            ]
        );
        assert_eq!(capture.latest_snapshot(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_only_first_final_delivered() {
        let (sink, seen) = recording_sink();
        let capture = CommandCapture::new(
            &shell(r"printf 'final\tone\nfinal\ttwo\n'; sleep 0.1"),
            sink,
        );
        capture.start().await.unwrap();
        wait_for_final(&seen).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Transcript::Final("one".to_owned())]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_closes_stdin() {
        // cat echoes until stdin closes, then the script emits the final
        let (sink, seen) = recording_sink();
        let capture = CommandCapture::new(
            &shell(r"cat >/dev/null; printf 'final\tdone\n'"),
            sink,
        );
        capture.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().unwrap().is_empty());

        capture.stop();
        wait_for_final(&seen).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Transcript::Final("done".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_missing_transcriber() {
        let (sink, _) = recording_sink();
        let config = CaptureConfig {
            command: "openclaw-vox-no-such-transcriber".to_owned(),
            args: Vec::new(),
        };
        let capture = CommandCapture::new(&config, sink);

        assert!(matches!(capture.acquire().await, Capability::Denied(_)));
        assert!(matches!(
            capture.start().await,
            Err(CaptureError::EngineStart(_))
        ));
        assert_eq!(capture.latest_snapshot(), "");
    }
}
