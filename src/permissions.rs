/// Input Monitoring (listen-event access) check
///
/// The event tap backend needs this permission; the registered hotkey does not.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionCheck {
    /// Whether listen-only event taps are currently allowed
    fn listen_access_granted(&self) -> bool;

    /// Ask the OS to show its Input Monitoring prompt (non-blocking)
    fn request_listen_access(&self);
}

/// Check backed by the `CGPreflightListenEventAccess` family
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPermissions;

#[cfg(target_os = "macos")]
#[allow(unsafe_code)]
mod ffi {
    #[link(name = "CoreGraphics", kind = "framework")]
    extern "C" {
        fn CGPreflightListenEventAccess() -> bool;
        fn CGRequestListenEventAccess() -> bool;
    }

    pub fn preflight_listen() -> bool {
        // SAFETY: plain query with no arguments, available since macOS 10.15
        unsafe { CGPreflightListenEventAccess() }
    }

    pub fn request_listen() -> bool {
        // SAFETY: shows the system prompt at most once per process
        unsafe { CGRequestListenEventAccess() }
    }
}

impl PermissionCheck for SystemPermissions {
    fn listen_access_granted(&self) -> bool {
        tracing::debug!("checking input monitoring permission");

        #[cfg(target_os = "macos")]
        {
            ffi::preflight_listen()
        }

        #[cfg(not(target_os = "macos"))]
        {
            false
        }
    }

    fn request_listen_access(&self) {
        tracing::info!("requesting input monitoring permission");

        #[cfg(target_os = "macos")]
        {
            let granted = ffi::request_listen();
            tracing::info!(granted, "input monitoring request returned");
        }
    }
}
