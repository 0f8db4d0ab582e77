use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = ".openclaw-vox.toml";
const FALLBACK_CLIENT_ID: &str = "macbook";

/// Contents of `~/.openclaw-vox.toml`
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// `[hotkey]`
    pub hotkey: HotkeyConfig,
    /// `[agent]`
    pub agent: AgentConfig,
    /// `[gateway]`
    pub gateway: GatewayConfig,
    /// `[session]`
    pub session: SessionConfig,
    /// `[capture]`
    pub capture: CaptureConfig,
    /// `[speech]`
    pub speech: SpeechConfig,
    /// `[telemetry]`
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
/// Push-to-talk hotkey
pub struct HotkeyConfig {
    /// Any of Command, Control, Option, Shift
    pub modifiers: Vec<String>,
    /// Key name, e.g. `Space` or `Z`
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            modifiers: vec!["Control".to_owned(), "Option".to_owned()],
            key: "Space".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
/// Agent identity and reply handling
pub struct AgentConfig {
    /// Display name shown in the menu bar
    pub name: String,
    /// Gateway session the messages belong to
    pub session_id: String,
    /// Speak the short form of each reply
    pub auto_speak: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "OpenClaw".to_owned(),
            session_id: "agent:main:main".to_owned(),
            auto_speak: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Scheme and host, e.g. `https://gw.example.com`
    pub base_url: String,
    /// Bearer token; requests are refused while empty
    pub token: String,
    /// Channel path segment
    pub channel: String,
    /// Identifies this machine to the gateway (host name by default)
    pub client_id: String,
    /// Message request timeout
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            channel: "openclaw-vox".to_owned(),
            client_id: client_id_from(host_name().as_deref()),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
/// Push-to-talk timing
pub struct SessionConfig {
    /// Delay after key release before the transcript is sent without a final result
    pub fallback_send_ms: u64,
    /// Idle time before the overlay hides itself
    pub idle_dismiss_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fallback_send_ms: 350,
            idle_dismiss_ms: 4000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
/// Transcriber process
pub struct CaptureConfig {
    /// Streaming transcriber; prints `partial\t...` / `final\t...` lines
    pub command: String,
    /// Extra arguments
    pub args: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "openclaw-stt".to_owned(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
/// Speech output command
pub struct SpeechConfig {
    /// Program fed one unit of text on stdin
    pub command: String,
    /// `-v` voice name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Words per minute
    pub rate: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: "say".to_owned(),
            voice: None,
            rate: 190,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
/// Logging
pub struct TelemetryConfig {
    /// Log to a file instead of stdout
    pub enabled: bool,
    /// Log file, `~` expanded
    pub log_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "~/.openclaw-vox/vox.log".to_owned(),
        }
    }
}

/// Client id sent with each message: the host's display name when known
fn client_id_from(host_name: Option<&str>) -> String {
    host_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_CLIENT_ID)
        .to_owned()
}

#[cfg(target_os = "macos")]
#[allow(unsafe_code, unused_unsafe)]
fn host_name() -> Option<String> {
    use objc2_foundation::NSHost;

    // SAFETY: class method returning the process-wide host object
    let name = unsafe { NSHost::currentHost().localizedName() }?;
    Some(name.to_string())
}

#[cfg(not(target_os = "macos"))]
const fn host_name() -> Option<String> {
    None
}

impl Config {
    /// Flip auto-speak and return the new value
    ///
    /// The caller persists it; this copy is authoritative, not the session's snapshot.
    pub fn toggle_auto_speak(&mut self) -> bool {
        self.agent.auto_speak = !self.agent.auto_speak;
        self.agent.auto_speak
    }

    /// Load config from ~/.openclaw-vox.toml, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::default()
                .save_to(&config_path)
                .context("failed to create default config")?;
        }

        Self::load_from(&config_path)
    }

    /// Parse a config file; missing sections and keys take their defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        toml::from_str(&contents).context("failed to parse config TOML")
    }

    /// Write back to ~/.openclaw-vox.toml
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Write to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(CONFIG_FILE))
    }

    /// Expand ~ in paths to home directory
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
