//! openclaw-vox - push-to-talk menu-bar voice front-end for an agent gateway
//!
//! The binary wires these modules together on the macOS main thread; the
//! library exists so every piece can be tested on its own.

/// Gateway client and reply normalization
pub mod agent;
/// Speech capture (streaming transcriber)
pub mod capture;
/// Configuration management
pub mod config;
/// Global push-to-talk hotkey backends and selection
pub mod input;
/// macOS permission checks
pub mod permissions;
/// Presentation surface contract
pub mod present;
/// Push-to-talk session state machine
pub mod session;
/// Speech output
pub mod speech;
/// Structured logging setup
pub mod telemetry;
/// Menu bar status item
pub mod tray;
/// Wake-from-sleep detection
pub mod wake;
