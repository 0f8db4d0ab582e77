use tracing::debug;

use crate::input::keys::{HotkeySpec, Modifiers};
use crate::input::HotkeyEvent;

/// Raw keyboard event class observed by the event tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKeyKind {
    /// Key pressed (including auto-repeat)
    KeyDown,
    /// Key released
    KeyUp,
    /// Modifier state changed
    FlagsChanged,
}

/// Why the OS switched the event tap off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDisableCause {
    /// Callback took too long under load
    Timeout,
    /// User security action (secure input, screenshot UI, ...)
    UserInput,
}

impl TapDisableCause {
    /// Name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::UserInput => "user-input",
        }
    }
}

/// What an event tap callback was invoked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapSignal {
    /// A keyboard event to feed the edge filter
    Key(RawKeyKind),
    /// The OS switched the tap off; it must be re-enabled
    Disabled(TapDisableCause),
    /// Anything else; passed through untouched
    Other,
}

// CGEventType raw values
const KEY_DOWN: u32 = 10;
const KEY_UP: u32 = 11;
const FLAGS_CHANGED: u32 = 12;
const TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
const TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

/// Classify a raw `CGEventType` code
#[must_use]
pub const fn classify_event_type(code: u32) -> TapSignal {
    match code {
        KEY_DOWN => TapSignal::Key(RawKeyKind::KeyDown),
        KEY_UP => TapSignal::Key(RawKeyKind::KeyUp),
        FLAGS_CHANGED => TapSignal::Key(RawKeyKind::FlagsChanged),
        TAP_DISABLED_BY_TIMEOUT => TapSignal::Disabled(TapDisableCause::Timeout),
        TAP_DISABLED_BY_USER_INPUT => TapSignal::Disabled(TapDisableCause::UserInput),
        _ => TapSignal::Other,
    }
}

/// Down/up edge detection for one key + modifier combination
///
/// Pure state machine fed by the event tap callback. A second key-down
/// while pressed (auto-repeat) and a key-up while released are dropped.
#[derive(Debug, Clone)]
pub struct KeyEdgeFilter {
    target_code: i64,
    required: Modifiers,
    is_pressed: bool,
}

impl KeyEdgeFilter {
    /// Create a filter for the given hotkey
    #[must_use]
    pub fn new(spec: &HotkeySpec) -> Self {
        Self {
            target_code: i64::from(spec.virtual_code),
            required: spec.modifiers,
            is_pressed: false,
        }
    }

    /// Whether the hotkey is currently held
    #[must_use]
    pub const fn is_pressed(&self) -> bool {
        self.is_pressed
    }

    /// Feed one raw event; returns the edge it produces, if any
    pub fn observe(
        &mut self,
        kind: RawKeyKind,
        key_code: i64,
        modifiers: Modifiers,
    ) -> Option<HotkeyEvent> {
        match kind {
            RawKeyKind::KeyDown | RawKeyKind::KeyUp => {
                if key_code != self.target_code || !modifiers.contains(self.required) {
                    return None;
                }
                if kind == RawKeyKind::KeyDown {
                    if self.is_pressed {
                        return None;
                    }
                    self.is_pressed = true;
                    Some(HotkeyEvent::Down)
                } else {
                    if !self.is_pressed {
                        return None;
                    }
                    self.is_pressed = false;
                    Some(HotkeyEvent::Up)
                }
            }
            RawKeyKind::FlagsChanged => {
                // Modifier released before the key: the key-up will arrive
                // without the required flags and never match.
                if self.is_pressed && !modifiers.contains(self.required) {
                    debug!("required modifier released while hotkey held");
                    self.is_pressed = false;
                    return Some(HotkeyEvent::Up);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACE: i64 = 0x31;

    fn ctrl_opt() -> Modifiers {
        Modifiers {
            control: true,
            option: true,
            ..Modifiers::NONE
        }
    }

    #[test]
    fn test_tap_disabled_codes_are_classified() {
        assert_eq!(
            classify_event_type(0xFFFF_FFFE),
            TapSignal::Disabled(TapDisableCause::Timeout)
        );
        assert_eq!(
            classify_event_type(0xFFFF_FFFF),
            TapSignal::Disabled(TapDisableCause::UserInput)
        );
        assert_eq!(TapDisableCause::Timeout.as_str(), "timeout");
        assert_eq!(TapDisableCause::UserInput.as_str(), "user-input");
    }

    #[test]
    fn test_key_codes_are_classified() {
        assert_eq!(classify_event_type(10), TapSignal::Key(RawKeyKind::KeyDown));
        assert_eq!(classify_event_type(11), TapSignal::Key(RawKeyKind::KeyUp));
        assert_eq!(
            classify_event_type(12),
            TapSignal::Key(RawKeyKind::FlagsChanged)
        );
        // Null, mouse down, scroll wheel
        for code in [0, 1, 22] {
            assert_eq!(classify_event_type(code), TapSignal::Other);
        }
    }

    fn filter() -> KeyEdgeFilter {
        let spec =
            HotkeySpec::parse("Space", &["Control".to_owned(), "Option".to_owned()]).unwrap();
        KeyEdgeFilter::new(&spec)
    }

    #[test]
    fn test_down_then_up() {
        let mut f = filter();
        assert_eq!(
            f.observe(RawKeyKind::KeyDown, SPACE, ctrl_opt()),
            Some(HotkeyEvent::Down)
        );
        assert!(f.is_pressed());
        assert_eq!(
            f.observe(RawKeyKind::KeyUp, SPACE, ctrl_opt()),
            Some(HotkeyEvent::Up)
        );
        assert!(!f.is_pressed());
    }

    #[test]
    fn test_auto_repeat_is_ignored() {
        let mut f = filter();
        assert!(f.observe(RawKeyKind::KeyDown, SPACE, ctrl_opt()).is_some());
        for _ in 0..5 {
            assert_eq!(f.observe(RawKeyKind::KeyDown, SPACE, ctrl_opt()), None);
        }
        assert_eq!(
            f.observe(RawKeyKind::KeyUp, SPACE, ctrl_opt()),
            Some(HotkeyEvent::Up)
        );
    }

    #[test]
    fn test_up_without_down_is_ignored() {
        let mut f = filter();
        assert_eq!(f.observe(RawKeyKind::KeyUp, SPACE, ctrl_opt()), None);
    }

    #[test]
    fn test_wrong_key_is_ignored() {
        let mut f = filter();
        assert_eq!(f.observe(RawKeyKind::KeyDown, 0x06, ctrl_opt()), None);
        assert!(!f.is_pressed());
    }

    #[test]
    fn test_missing_modifier_is_ignored() {
        let mut f = filter();
        let only_ctrl = Modifiers {
            control: true,
            ..Modifiers::NONE
        };
        assert_eq!(f.observe(RawKeyKind::KeyDown, SPACE, only_ctrl), None);
    }

    #[test]
    fn test_extra_modifier_still_matches() {
        let mut f = filter();
        let with_shift = Modifiers {
            shift: true,
            ..ctrl_opt()
        };
        assert_eq!(
            f.observe(RawKeyKind::KeyDown, SPACE, with_shift),
            Some(HotkeyEvent::Down)
        );
    }

    #[test]
    fn test_modifier_release_while_held_emits_up_once() {
        let mut f = filter();
        f.observe(RawKeyKind::KeyDown, SPACE, ctrl_opt());

        let only_opt = Modifiers {
            option: true,
            ..Modifiers::NONE
        };
        assert_eq!(
            f.observe(RawKeyKind::FlagsChanged, 0x3B, only_opt),
            Some(HotkeyEvent::Up)
        );
        // Bare key-up afterwards does not match and must not double-release
        assert_eq!(f.observe(RawKeyKind::KeyUp, SPACE, Modifiers::NONE), None);
        assert_eq!(f.observe(RawKeyKind::KeyUp, SPACE, ctrl_opt()), None);
    }

    #[test]
    fn test_flags_changed_while_released_is_ignored() {
        let mut f = filter();
        assert_eq!(
            f.observe(RawKeyKind::FlagsChanged, 0x3B, Modifiers::NONE),
            None
        );
        assert_eq!(f.observe(RawKeyKind::FlagsChanged, 0x3B, ctrl_opt()), None);
    }
}
