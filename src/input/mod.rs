//! Global push-to-talk hotkey capture.
//!
//! Two interchangeable backends deliver the same [`HotkeyEvent`] stream:
//! a listen-only event tap (needs Input Monitoring) and a registered system
//! hotkey (no extra permission). [`selector::BackendSelector`] picks one.

use std::sync::Arc;
use thiserror::Error;

#[cfg(target_os = "macos")]
pub mod event_tap;
pub mod filter;
pub mod keys;
pub mod registered;
pub mod selector;

/// Physical edge of the push-to-talk hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeyEvent {
    /// Key went down with the required modifiers held
    Down,
    /// Key (or a required modifier) was released
    Up,
}

impl HotkeyEvent {
    /// Short lowercase name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Up => "up",
        }
    }
}

/// Callback receiving hotkey edges together with the name of the backend that saw them
pub type HotkeySink = Arc<dyn Fn(HotkeyEvent, &'static str) + Send + Sync>;

/// A low-level source of hotkey edges
///
/// Backends are built by a [`selector::BackendFactory`] and started by the
/// selector. Dropping a backend must release every OS-level registration it holds.
pub trait HotkeyBackend {
    /// Begin delivering events to the sink given at construction
    ///
    /// # Errors
    /// Returns error if the OS refuses the tap or the registration
    fn start(&mut self) -> Result<(), HotkeyError>;

    /// Name reported alongside every event and in the status label
    fn source_name(&self) -> &'static str;
}

/// Builds the real event-tap and registered-hotkey backends
#[cfg(target_os = "macos")]
pub struct SystemBackends {
    registry: std::rc::Rc<registered::HotkeyRegistry>,
}

#[cfg(target_os = "macos")]
impl SystemBackends {
    /// Share `registry` with every fallback backend built from here
    #[must_use]
    pub const fn new(registry: std::rc::Rc<registered::HotkeyRegistry>) -> Self {
        Self { registry }
    }
}

#[cfg(target_os = "macos")]
impl selector::BackendFactory for SystemBackends {
    fn primary(&self, spec: &keys::HotkeySpec, sink: HotkeySink) -> Box<dyn HotkeyBackend> {
        Box::new(event_tap::EventTapBackend::new(spec.clone(), sink))
    }

    fn fallback(&self, spec: &keys::HotkeySpec, sink: HotkeySink) -> Box<dyn HotkeyBackend> {
        Box::new(registered::RegisteredHotkeyBackend::new(
            std::rc::Rc::clone(&self.registry),
            spec.clone(),
            sink,
        ))
    }
}

/// Hotkey setup errors
#[derive(Debug, Error)]
pub enum HotkeyError {
    /// Key name not in the supported key table
    #[error("unsupported key: {0}")]
    UnknownKey(String),

    /// Modifier name not recognised
    #[error("unknown modifier: {0}")]
    UnknownModifier(String),

    /// The system-wide event tap could not be created
    #[error("failed to create event tap: {0}")]
    TapCreation(String),

    /// The hotkey registration was refused
    #[error("failed to register hotkey: {0}")]
    Registration(String),
}
