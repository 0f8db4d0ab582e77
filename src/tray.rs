//! Menu bar status item.
//!
//! [`MenuModel`] is the pure view of what the menu shows; [`TrayManager`]
//! (macOS) renders it and turns clicks into [`MenuCommand`]s.

use crate::session::SessionSnapshot;

/// Clickable menu entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    /// Prompt for Input Monitoring and reselect the backend
    RequestAccess,
    /// Check gateway health
    TestConnection,
    /// Start or stop listening
    ToggleRecording,
    /// Bring the conversation up
    ShowOverlay,
    /// Stop everything and hide
    Dismiss,
    /// Flip and persist auto-speak
    ToggleAutoSpeak,
    /// Shut the session down and exit
    Quit,
}

impl MenuCommand {
    /// Every command, in menu order
    pub const ALL: [Self; 7] = [
        Self::RequestAccess,
        Self::TestConnection,
        Self::ToggleRecording,
        Self::ShowOverlay,
        Self::Dismiss,
        Self::ToggleAutoSpeak,
        Self::Quit,
    ];

    /// Stable menu item id
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::RequestAccess => "request-access",
            Self::TestConnection => "test-connection",
            Self::ToggleRecording => "toggle-recording",
            Self::ShowOverlay => "show-overlay",
            Self::Dismiss => "dismiss",
            Self::ToggleAutoSpeak => "auto-speak",
            Self::Quit => "quit",
        }
    }

    /// Map a clicked item id back to its command
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }
}

/// Icon variant; the icon is rebuilt only when this changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconState {
    /// Nothing happening
    Idle,
    /// Capture running
    Listening,
    /// Waiting on the agent, revealing or speaking
    Busy,
}

impl IconState {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    const ALL: [Self; 3] = [Self::Idle, Self::Listening, Self::Busy];

    const fn color(self) -> [u8; 3] {
        match self {
            Self::Idle => [0x9a, 0x9a, 0x9a],
            Self::Listening => [0xe5, 0x3e, 0x3e],
            Self::Busy => [0x3b, 0x82, 0xf6],
        }
    }
}

/// Side of the square tray icon in pixels
pub const ICON_SIZE: u32 = 32;

/// Filled circle on a transparent square, RGBA8
#[must_use]
pub fn icon_rgba(state: IconState) -> Vec<u8> {
    let [r, g, b] = state.color();
    let size = f64::from(ICON_SIZE);
    let center = size / 2.0;
    let radius = size / 2.0 - 3.0;
    let mut pixels = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);
    for y in 0..ICON_SIZE {
        for x in 0..ICON_SIZE {
            let dx = f64::from(x) + 0.5 - center;
            let dy = f64::from(y) + 0.5 - center;
            let inside = dx.hypot(dy) <= radius;
            let alpha = if inside { 0xff } else { 0x00 };
            pixels.extend_from_slice(&[r, g, b, alpha]);
        }
    }
    pixels
}

/// Everything the menu renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuModel {
    /// Display name of the agent (also the tooltip)
    pub agent_name: String,
    /// Hotkey in symbol form
    pub hotkey: String,
    /// Backend selector label
    pub backend: String,
    /// Latest session state
    pub session: SessionSnapshot,
}

impl MenuModel {
    /// First line: agent name and session status
    #[must_use]
    pub fn status_line(&self) -> String {
        let activity = if self.session.is_speaking && !self.session.is_recording {
            "Speaking"
        } else {
            self.session.status.as_str()
        };
        format!("{}: {activity}", self.agent_name)
    }

    /// Which hotkey backend is live
    #[must_use]
    pub fn backend_line(&self) -> String {
        format!("Hotkey {}: {}", self.hotkey, self.backend)
    }

    /// Result of the last connection test
    #[must_use]
    pub fn connection_line(&self) -> String {
        format!("Gateway: {}", self.session.connection)
    }

    /// Text of the toggle-recording item
    #[must_use]
    pub const fn recording_label(&self) -> &'static str {
        if self.session.is_recording {
            "Stop Listening"
        } else {
            "Start Listening"
        }
    }

    /// Icon matching the session activity
    #[must_use]
    pub const fn icon_state(&self) -> IconState {
        if self.session.is_recording {
            IconState::Listening
        } else if self.session.is_thinking || self.session.is_speaking {
            IconState::Busy
        } else {
            IconState::Idle
        }
    }
}

#[cfg(target_os = "macos")]
pub use mac::TrayManager;

#[cfg(target_os = "macos")]
mod mac {
    use std::collections::HashMap;

    use anyhow::{Context, Result};
    use tray_icon::menu::{CheckMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

    use super::{icon_rgba, IconState, MenuCommand, MenuModel, ICON_SIZE};

    /// Owns the status item; main thread only
    pub struct TrayManager {
        tray: TrayIcon,
        model: MenuModel,
        cached_icons: HashMap<IconState, Icon>,
    }

    impl TrayManager {
        /// Create the status item showing `model`
        ///
        /// # Errors
        /// Returns error if an icon or the menu cannot be built
        pub fn new(model: MenuModel) -> Result<Self> {
            let mut cached_icons = HashMap::new();
            for state in IconState::ALL {
                let icon = Icon::from_rgba(icon_rgba(state), ICON_SIZE, ICON_SIZE)
                    .with_context(|| format!("failed to create {state:?} icon"))?;
                cached_icons.insert(state, icon);
            }
            let tray = Self::build_tray(&model, &cached_icons)?;
            Ok(Self {
                tray,
                model,
                cached_icons,
            })
        }

        fn build_tray(model: &MenuModel, icons: &HashMap<IconState, Icon>) -> Result<TrayIcon> {
            let icon = icons
                .get(&model.icon_state())
                .with_context(|| format!("icon for {:?} not in cache", model.icon_state()))?
                .clone();
            TrayIconBuilder::new()
                .with_menu(Box::new(Self::build_menu(model)?))
                .with_tooltip(&model.agent_name)
                .with_icon(icon)
                .build()
                .context("failed to build tray icon")
        }

        fn build_menu(model: &MenuModel) -> Result<Menu> {
            let menu = Menu::new();

            let status = MenuItem::new(model.status_line(), false, None);
            let backend = MenuItem::new(model.backend_line(), false, None);
            let connection = MenuItem::new(model.connection_line(), false, None);
            menu.append_items(&[&status, &backend, &connection])
                .context("failed to append status items")?;
            menu.append(&PredefinedMenuItem::separator())
                .context("failed to append separator")?;

            let request_access = item(MenuCommand::RequestAccess, "Request Input Monitoring Access", true);
            let test_connection = item(
                MenuCommand::TestConnection,
                "Test Connection",
                !model.session.testing_connection,
            );
            menu.append_items(&[&request_access, &test_connection])
                .context("failed to append setup items")?;
            menu.append(&PredefinedMenuItem::separator())
                .context("failed to append separator")?;

            let toggle = item(MenuCommand::ToggleRecording, model.recording_label(), true);
            let show = item(MenuCommand::ShowOverlay, "Show Conversation", true);
            let dismiss = item(MenuCommand::Dismiss, "Dismiss", true);
            let auto_speak = CheckMenuItem::with_id(
                MenuCommand::ToggleAutoSpeak.id(),
                "Speak Replies",
                true,
                model.session.auto_speak,
                None,
            );
            menu.append_items(&[&toggle, &show, &dismiss, &auto_speak])
                .context("failed to append session items")?;
            menu.append(&PredefinedMenuItem::separator())
                .context("failed to append separator")?;

            // Not PredefinedMenuItem::quit: that exits without telling the session
            menu.append(&item(MenuCommand::Quit, "Quit", true))
                .context("failed to append quit item")?;

            Ok(menu)
        }

        /// Re-render if anything visible changed
        ///
        /// # Errors
        /// Returns error if the menu or icon cannot be rebuilt
        pub fn update(&mut self, model: MenuModel) -> Result<()> {
            if model == self.model {
                return Ok(());
            }
            if model.icon_state() == self.model.icon_state() {
                self.tray
                    .set_menu(Some(Box::new(Self::build_menu(&model)?)));
            } else {
                tracing::debug!(
                    from = ?self.model.icon_state(),
                    to = ?model.icon_state(),
                    "tray icon state change"
                );
                // set_icon does not reliably redraw; rebuild the whole item
                self.tray = Self::build_tray(&model, &self.cached_icons)?;
            }
            self.model = model;
            Ok(())
        }

        /// Next clicked command, if any
        #[must_use]
        pub fn poll_events() -> Option<MenuCommand> {
            let event = MenuEvent::receiver().try_recv().ok()?;
            let id = event.id.0.as_str();
            tracing::debug!(id, "tray menu event received");
            MenuCommand::from_id(id)
        }
    }

    fn item(command: MenuCommand, text: &str, enabled: bool) -> MenuItem {
        MenuItem::with_id(command.id(), text, enabled, None)
    }
}
