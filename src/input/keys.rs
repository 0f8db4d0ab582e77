use std::fmt;

use crate::config::HotkeyConfig;
use crate::input::HotkeyError;

/// Supported keys: (config name, macOS virtual key code, W3C code name)
///
/// Virtual key codes are the `kVK_*` constants from Carbon `Events.h`.
const KEY_TABLE: &[(&str, u16, &str)] = &[
    ("A", 0x00, "KeyA"),
    ("S", 0x01, "KeyS"),
    ("D", 0x02, "KeyD"),
    ("F", 0x03, "KeyF"),
    ("H", 0x04, "KeyH"),
    ("G", 0x05, "KeyG"),
    ("Z", 0x06, "KeyZ"),
    ("X", 0x07, "KeyX"),
    ("C", 0x08, "KeyC"),
    ("V", 0x09, "KeyV"),
    ("B", 0x0B, "KeyB"),
    ("Q", 0x0C, "KeyQ"),
    ("W", 0x0D, "KeyW"),
    ("E", 0x0E, "KeyE"),
    ("R", 0x0F, "KeyR"),
    ("Y", 0x10, "KeyY"),
    ("T", 0x11, "KeyT"),
    ("1", 0x12, "Digit1"),
    ("2", 0x13, "Digit2"),
    ("3", 0x14, "Digit3"),
    ("4", 0x15, "Digit4"),
    ("6", 0x16, "Digit6"),
    ("5", 0x17, "Digit5"),
    ("9", 0x19, "Digit9"),
    ("7", 0x1A, "Digit7"),
    ("8", 0x1C, "Digit8"),
    ("0", 0x1D, "Digit0"),
    ("O", 0x1F, "KeyO"),
    ("U", 0x20, "KeyU"),
    ("I", 0x22, "KeyI"),
    ("P", 0x23, "KeyP"),
    ("Return", 0x24, "Enter"),
    ("L", 0x25, "KeyL"),
    ("J", 0x26, "KeyJ"),
    ("K", 0x28, "KeyK"),
    ("N", 0x2D, "KeyN"),
    ("M", 0x2E, "KeyM"),
    ("Tab", 0x30, "Tab"),
    ("Space", 0x31, "Space"),
    ("Escape", 0x35, "Escape"),
    ("F5", 0x60, "F5"),
    ("F6", 0x61, "F6"),
    ("F7", 0x62, "F7"),
    ("F3", 0x63, "F3"),
    ("F8", 0x64, "F8"),
    ("F9", 0x65, "F9"),
    ("F11", 0x67, "F11"),
    ("F10", 0x6D, "F10"),
    ("F12", 0x6F, "F12"),
    ("F4", 0x76, "F4"),
    ("F2", 0x78, "F2"),
    ("F1", 0x7A, "F1"),
];

/// Modifier set restricted to command, control, option and shift
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[allow(clippy::struct_excessive_bools)]
pub struct Modifiers {
    /// ⌘
    pub command: bool,
    /// ⌃
    pub control: bool,
    /// ⌥
    pub option: bool,
    /// ⇧
    pub shift: bool,
}

impl Modifiers {
    /// No modifiers
    pub const NONE: Self = Self {
        command: false,
        control: false,
        option: false,
        shift: false,
    };

    /// Parse modifier names from config
    ///
    /// # Errors
    /// Returns error on an unrecognised name
    pub fn from_names(names: &[String]) -> Result<Self, HotkeyError> {
        let mut result = Self::NONE;
        for name in names {
            match name.as_str() {
                "Control" | "Ctrl" => result.control = true,
                "Option" | "Alt" => result.option = true,
                "Command" | "Cmd" | "Super" => result.command = true,
                "Shift" => result.shift = true,
                _ => return Err(HotkeyError::UnknownModifier(name.clone())),
            }
        }
        Ok(result)
    }

    /// True if every modifier set in `required` is also set in `self`
    #[must_use]
    pub const fn contains(self, required: Self) -> bool {
        (self.command || !required.command)
            && (self.control || !required.control)
            && (self.option || !required.option)
            && (self.shift || !required.shift)
    }

    /// Extract the four tracked modifiers from event tap flags
    #[cfg(target_os = "macos")]
    #[must_use]
    pub fn from_cg_flags(flags: core_graphics::event::CGEventFlags) -> Self {
        use core_graphics::event::CGEventFlags;
        Self {
            command: flags.contains(CGEventFlags::CGEventFlagCommand),
            control: flags.contains(CGEventFlags::CGEventFlagControl),
            option: flags.contains(CGEventFlags::CGEventFlagAlternate),
            shift: flags.contains(CGEventFlags::CGEventFlagShift),
        }
    }

    /// Convert to the registration backend's modifier type
    #[cfg(target_os = "macos")]
    #[must_use]
    pub fn to_registration(self) -> global_hotkey::hotkey::Modifiers {
        use global_hotkey::hotkey::Modifiers as M;
        let mut result = M::empty();
        if self.command {
            result |= M::SUPER;
        }
        if self.control {
            result |= M::CONTROL;
        }
        if self.option {
            result |= M::ALT;
        }
        if self.shift {
            result |= M::SHIFT;
        }
        result
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // macOS menu order: ⌃ ⌥ ⇧ ⌘
        if self.control {
            f.write_str("\u{2303}")?;
        }
        if self.option {
            f.write_str("\u{2325}")?;
        }
        if self.shift {
            f.write_str("\u{21E7}")?;
        }
        if self.command {
            f.write_str("\u{2318}")?;
        }
        Ok(())
    }
}

/// Fully resolved push-to-talk hotkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeySpec {
    /// Key name as written in config
    pub key_name: &'static str,
    /// macOS virtual key code matched by the event tap
    pub virtual_code: u16,
    /// W3C code name used by the registration backend
    pub w3c_code: &'static str,
    /// Modifiers that must be held
    pub modifiers: Modifiers,
}

impl HotkeySpec {
    /// Resolve a key name and modifier names
    ///
    /// # Errors
    /// Returns error if the key or a modifier is not supported
    pub fn parse(key: &str, modifiers: &[String]) -> Result<Self, HotkeyError> {
        let &(key_name, virtual_code, w3c_code) = KEY_TABLE
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(key))
            .ok_or_else(|| HotkeyError::UnknownKey(key.to_owned()))?;

        Ok(Self {
            key_name,
            virtual_code,
            w3c_code,
            modifiers: Modifiers::from_names(modifiers)?,
        })
    }

    /// Resolve from the `[hotkey]` config section
    ///
    /// # Errors
    /// Returns error if the key or a modifier is not supported
    pub fn from_config(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        Self::parse(&config.key, &config.modifiers)
    }

    /// Key code in the registration backend's representation
    ///
    /// # Errors
    /// Returns error if the W3C name is not known to the backend
    #[cfg(target_os = "macos")]
    pub fn registration_code(&self) -> Result<global_hotkey::hotkey::Code, HotkeyError> {
        self.w3c_code
            .parse()
            .map_err(|_| HotkeyError::UnknownKey(self.w3c_code.to_owned()))
    }
}

impl fmt::Display for HotkeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.modifiers, self.key_name)
    }
}
