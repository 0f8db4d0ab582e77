//! Wake-from-sleep detection.
//!
//! The monotonic clock stops while the machine sleeps; the wall clock does
//! not. When the wall clock has advanced noticeably more than the monotonic
//! clock between two polls, the machine slept in between.

use std::time::{Duration, Instant, SystemTime};

use tracing::info;

/// Smallest sleep worth reacting to
pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(5);

/// Whether the wall clock outran the monotonic clock by more than `threshold`
///
/// A wall clock that went backwards (manual change, NTP step) never counts.
#[must_use]
pub fn slept_between(wall_elapsed: Option<Duration>, mono_elapsed: Duration, threshold: Duration) -> bool {
    wall_elapsed
        .and_then(|wall| wall.checked_sub(mono_elapsed))
        .is_some_and(|gap| gap > threshold)
}

/// Polled from the main loop; reports each wake once
#[derive(Debug)]
pub struct WakeDetector {
    threshold: Duration,
    last_wall: SystemTime,
    last_mono: Instant,
}

impl Default for WakeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl WakeDetector {
    /// Start measuring from now
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_wall: SystemTime::now(),
            last_mono: Instant::now(),
        }
    }

    /// Sample both clocks; `true` if the machine slept since the last poll
    pub fn poll(&mut self) -> bool {
        let wall = SystemTime::now();
        let mono = Instant::now();
        let woke = slept_between(
            wall.duration_since(self.last_wall).ok(),
            mono.duration_since(self.last_mono),
            self.threshold,
        );
        self.last_wall = wall;
        self.last_mono = mono;
        if woke {
            info!("wake from sleep detected");
        }
        woke
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_regular_poll_is_not_a_wake() {
        assert!(!slept_between(Some(SECOND), SECOND, DEFAULT_THRESHOLD));
        assert!(!slept_between(
            Some(Duration::from_millis(1_200)),
            Duration::from_millis(1_000),
            DEFAULT_THRESHOLD
        ));
    }

    #[test]
    fn test_long_wall_gap_is_a_wake() {
        assert!(slept_between(Some(SECOND * 600), SECOND, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!slept_between(Some(SECOND * 6), SECOND, DEFAULT_THRESHOLD));
        assert!(slept_between(
            Some(SECOND * 6 + Duration::from_millis(1)),
            SECOND,
            DEFAULT_THRESHOLD
        ));
    }

    #[test]
    fn test_clock_set_backwards_is_ignored() {
        assert!(!slept_between(None, SECOND, DEFAULT_THRESHOLD));
        assert!(!slept_between(Some(Duration::ZERO), SECOND * 30, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_back_to_back_polls_do_not_report() {
        let mut detector = WakeDetector::default();
        assert!(!detector.poll());
        assert!(!detector.poll());
    }
}
