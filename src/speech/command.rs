use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::speech::{SpeechOutput, UtteranceOutcome};

struct Unit {
    text: String,
    generation: u64,
    done: oneshot::Sender<UtteranceOutcome>,
}

/// Speaks queued units one at a time through an external command (`say`)
///
/// The text goes to the command's stdin. `stop_all` bumps a generation
/// counter; units from an older generation are cancelled without running and
/// the running one is killed.
pub struct CommandSpeaker {
    queue: mpsc::UnboundedSender<Unit>,
    generation: watch::Sender<u64>,
    busy: Arc<AtomicBool>,
}

impl CommandSpeaker {
    /// Start the speech worker; must be called inside a tokio runtime
    #[must_use]
    pub fn spawn(config: &SpeechConfig) -> Self {
        Self::with_command(config.command.clone(), command_args(config))
    }

    fn with_command(program: String, args: Vec<String>) -> Self {
        let (queue, inbox) = mpsc::unbounded_channel();
        let (generation, generation_rx) = watch::channel(0);
        let busy = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_worker(
            program,
            args,
            inbox,
            generation_rx,
            Arc::clone(&busy),
        ));

        Self {
            queue,
            generation,
            busy,
        }
    }
}

fn command_args(config: &SpeechConfig) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(voice) = config.voice.as_deref().filter(|v| !v.is_empty()) {
        args.extend(["-v".to_owned(), voice.to_owned()]);
    }
    if config.rate > 0 {
        args.extend(["-r".to_owned(), config.rate.to_string()]);
    }
    args
}

async fn run_worker(
    program: String,
    args: Vec<String>,
    mut inbox: mpsc::UnboundedReceiver<Unit>,
    mut generation: watch::Receiver<u64>,
    busy: Arc<AtomicBool>,
) {
    while let Some(unit) = inbox.recv().await {
        let current = *generation.borrow_and_update();
        if unit.generation != current {
            let _ = unit.done.send(UtteranceOutcome::Cancelled);
            continue;
        }

        busy.store(true, Ordering::SeqCst);
        let outcome = speak(&program, &args, &unit.text, &mut generation).await;
        busy.store(false, Ordering::SeqCst);
        debug!(?outcome, "speech unit done");

        // Receiver gone means nobody is counting this unit any more
        let _ = unit.done.send(outcome);
    }
    debug!("speech worker stopped");
}

async fn speak(
    program: &str,
    args: &[String],
    text: &str,
    generation: &mut watch::Receiver<u64>,
) -> UtteranceOutcome {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(program, error = %e, "failed to start speech command");
            return UtteranceOutcome::Finished;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            warn!(error = %e, "failed to write speech text");
        }
    }

    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) if !status.success() => warn!(%status, "speech command failed"),
                Err(e) => warn!(error = %e, "speech command wait failed"),
                Ok(_) => {}
            }
            UtteranceOutcome::Finished
        }
        _ = generation.changed() => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill speech command");
            }
            UtteranceOutcome::Cancelled
        }
    }
}

impl SpeechOutput for CommandSpeaker {
    fn enqueue(&self, text: &str) -> oneshot::Receiver<UtteranceOutcome> {
        let (done, receiver) = oneshot::channel();
        let unit = Unit {
            text: text.to_owned(),
            generation: *self.generation.borrow(),
            done,
        };
        if self.queue.send(unit).is_err() {
            warn!("speech worker is gone, dropping unit");
        }
        receiver
    }

    fn stop_all(&self) {
        self.generation.send_modify(|g| *g += 1);
        info!("speech output stopped");
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}
