use std::fmt;

use tracing::{info, warn};

use crate::input::keys::HotkeySpec;
use crate::input::{HotkeyBackend, HotkeySink};
use crate::permissions::PermissionCheck;

/// Builds unstarted backends for the selector
pub trait BackendFactory {
    /// Event tap backend (requires Input Monitoring)
    fn primary(&self, spec: &HotkeySpec, sink: HotkeySink) -> Box<dyn HotkeyBackend>;

    /// Registered hotkey backend (no permission needed)
    fn fallback(&self, spec: &HotkeySpec, sink: HotkeySink) -> Box<dyn HotkeyBackend>;
}

/// Which backend kind is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Listen-only event tap
    Primary,
    /// OS hotkey registration
    Fallback,
}

/// Why a selection cycle ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReselectReason {
    /// Process start
    Startup,
    /// Machine woke from sleep
    Wake,
    /// User asked for Input Monitoring
    RequestAccess,
    /// Polled permission state changed
    PermissionChanged,
}

impl ReselectReason {
    /// Name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Wake => "wake",
            Self::RequestAccess => "request-access",
            Self::PermissionChanged => "permission-changed",
        }
    }
}

/// Outcome of one selection cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Backend kind that was chosen
    pub kind: BackendKind,
    /// Source name of the chosen backend
    pub source: &'static str,
    /// Input Monitoring state seen during selection
    pub permission_granted: bool,
    /// Whether the chosen backend started cleanly
    pub started: bool,
}

impl Selection {
    /// Human-readable backend and permission status
    #[must_use]
    pub fn label(&self) -> String {
        match (self.kind, self.permission_granted, self.started) {
            (BackendKind::Primary, _, _) => format!("{} (Input Monitoring: granted)", self.source),
            (BackendKind::Fallback, _, false) => {
                format!("{} fallback (registration failed)", self.source)
            }
            (BackendKind::Fallback, true, true) => format!("{} fallback", self.source),
            (BackendKind::Fallback, false, true) => format!(
                "{} fallback (enable Input Monitoring for event-tap)",
                self.source
            ),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Owns the single active hotkey backend
pub struct BackendSelector<P, F> {
    permissions: P,
    factory: F,
    spec: HotkeySpec,
    sink: HotkeySink,
    active: Option<Box<dyn HotkeyBackend>>,
    selection: Option<Selection>,
}

impl<P: PermissionCheck, F: BackendFactory> BackendSelector<P, F> {
    /// Create a selector; nothing is started until [`Self::reconfigure`]
    pub fn new(permissions: P, factory: F, spec: HotkeySpec, sink: HotkeySink) -> Self {
        Self {
            permissions,
            factory,
            spec,
            sink,
            active: None,
            selection: None,
        }
    }

    /// Tear down the current backend and pick a new one
    pub fn reconfigure(&mut self, reason: ReselectReason) -> &Selection {
        // Old backend goes first so two registrations never coexist.
        self.active = None;

        let granted = self.permissions.listen_access_granted();

        if granted {
            let mut primary = self.factory.primary(&self.spec, HotkeySink::clone(&self.sink));
            match primary.start() {
                Ok(()) => {
                    let selection = Selection {
                        kind: BackendKind::Primary,
                        source: primary.source_name(),
                        permission_granted: true,
                        started: true,
                    };
                    info!(reason = reason.as_str(), backend = %selection, "hotkey backend selected");
                    self.active = Some(primary);
                    return self.selection.insert(selection);
                }
                Err(e) => {
                    warn!(error = %e, "event tap unavailable, falling back");
                }
            }
        } else {
            info!("event tap unavailable (Input Monitoring not granted)");
        }

        let mut fallback = self.factory.fallback(&self.spec, HotkeySink::clone(&self.sink));
        let started = match fallback.start() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "hotkey registration failed; hotkey inactive");
                false
            }
        };
        let selection = Selection {
            kind: BackendKind::Fallback,
            source: fallback.source_name(),
            permission_granted: granted,
            started,
        };
        info!(reason = reason.as_str(), backend = %selection, "hotkey backend selected");
        self.active = Some(fallback);
        self.selection.insert(selection)
    }

    /// Prompt for Input Monitoring, then re-run selection
    pub fn request_access(&mut self) -> &Selection {
        self.permissions.request_listen_access();
        self.reconfigure(ReselectReason::RequestAccess)
    }

    /// Re-run selection if the permission state moved since the last cycle
    pub fn refresh_if_permission_changed(&mut self) -> Option<&Selection> {
        let granted = self.permissions.listen_access_granted();
        let changed = self
            .selection
            .as_ref()
            .is_some_and(|s| s.permission_granted != granted);
        if changed {
            Some(self.reconfigure(ReselectReason::PermissionChanged))
        } else {
            None
        }
    }

    /// Last selection, if any cycle has run
    #[must_use]
    pub const fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Status label for the menu bar
    #[must_use]
    pub fn label(&self) -> String {
        self.selection
            .as_ref()
            .map_or_else(|| "initializing\u{2026}".to_owned(), Selection::label)
    }

    /// Number of live backends (always 0 or 1)
    #[must_use]
    pub fn active_count(&self) -> usize {
        usize::from(self.active.is_some())
    }

    /// Hotkey this selector manages
    #[must_use]
    pub const fn spec(&self) -> &HotkeySpec {
        &self.spec
    }
}
