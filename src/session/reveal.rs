//! Typing-effect reveal of a reply, one character at a time.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::session::{SessionEvent, SessionHandle};

/// Revealed characters between overlay resizes
pub const RESIZE_EVERY: usize = 8;

/// Pause after `ch` before the next character
#[must_use]
pub const fn reveal_delay(ch: char) -> Duration {
    match ch {
        '.' | '!' | '?' => Duration::from_millis(45),
        ',' | ';' | ':' => Duration::from_millis(30),
        _ => Duration::from_millis(16),
    }
}

/// Post `text` into the session one character at a time
///
/// Aborting the returned task stops emission; characters already posted stay.
pub fn spawn(reveal: u64, text: String, handle: SessionHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        for ch in text.chars() {
            handle.post(SessionEvent::RevealChar { reveal, ch });
            tokio::time::sleep(reveal_delay(ch)).await;
        }
        handle.post(SessionEvent::RevealFinished { reveal });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reveal_delays() {
        for ch in ['.', '!', '?'] {
            assert_eq!(reveal_delay(ch), Duration::from_millis(45));
        }
        for ch in [',', ';', ':'] {
            assert_eq!(reveal_delay(ch), Duration::from_millis(30));
        }
        for ch in ['a', ' ', '\n', 'é', '-'] {
            assert_eq!(reveal_delay(ch), Duration::from_millis(16));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_paces_characters() {
        let (handle, mut inbox) = SessionHandle::channel();
        let start = tokio::time::Instant::now();
        let task = spawn(3, "Hi.".to_owned(), handle);
        task.await.unwrap();

        // 16 + 16 + 45
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(77) && elapsed < Duration::from_millis(80));

        let mut chars = String::new();
        while let Ok(event) = inbox.try_recv() {
            match event {
                SessionEvent::RevealChar { reveal: 3, ch } => chars.push(ch),
                SessionEvent::RevealFinished { reveal: 3 } => chars.push('|'),
                _ => chars.push('?'),
            }
        }
        assert_eq!(chars, "Hi.|");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_emission() {
        let (handle, mut inbox) = SessionHandle::channel();
        let task = spawn(1, "abcdefghij".to_owned(), handle);
        tokio::time::sleep(Duration::from_millis(40)).await;
        task.abort();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut count = 0;
        while let Ok(event) = inbox.try_recv() {
            assert!(matches!(event, SessionEvent::RevealChar { .. }));
            count += 1;
        }
        assert!(count > 0 && count < 10);
    }
}
