//! Primary backend: listen-only `CGEventTap` on the main run loop.
//!
//! Requires Input Monitoring. The tap never consumes events; other apps see
//! the hotkey exactly as before.

#![allow(unsafe_code)]

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

use core_foundation::base::TCFType;
use core_foundation::mach_port::CFMachPort;
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop, CFRunLoopSource};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use tracing::{debug, info, warn};

use crate::input::filter::{classify_event_type, KeyEdgeFilter, TapSignal};
use crate::input::keys::{HotkeySpec, Modifiers};
use crate::input::{HotkeyBackend, HotkeyError, HotkeySink};

/// Source name reported with events from this backend
pub const SOURCE_NAME: &str = "event-tap";

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapEnable(tap: *mut c_void, enable: bool);
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFMachPortInvalidate(port: *mut c_void);
}

fn set_tap_enabled(port: &CFMachPort, enable: bool) {
    // SAFETY: the port comes from a live CGEventTap and is retained by `port`.
    unsafe { CGEventTapEnable(port.as_concrete_TypeRef().cast::<c_void>(), enable) }
}

/// Event tap hotkey backend
pub struct EventTapBackend {
    spec: HotkeySpec,
    sink: HotkeySink,
    tap: Option<CGEventTap<'static>>,
    source: Option<CFRunLoopSource>,
    run_loop: Option<CFRunLoop>,
}

impl EventTapBackend {
    /// Create an unstarted backend for `spec`
    #[must_use]
    pub fn new(spec: HotkeySpec, sink: HotkeySink) -> Self {
        Self {
            spec,
            sink,
            tap: None,
            source: None,
            run_loop: None,
        }
    }
}

impl HotkeyBackend for EventTapBackend {
    fn start(&mut self) -> Result<(), HotkeyError> {
        if self.tap.is_some() {
            return Ok(());
        }
        let filter = RefCell::new(KeyEdgeFilter::new(&self.spec));
        let port_slot: Rc<RefCell<Option<CFMachPort>>> = Rc::new(RefCell::new(None));
        let callback_port = Rc::clone(&port_slot);
        let sink = HotkeySink::clone(&self.sink);

        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            match classify_event_type(event_type as u32) {
                TapSignal::Disabled(cause) => {
                    // Without this the hotkey silently dies until restart.
                    if let Some(port) = callback_port.borrow().as_ref() {
                        set_tap_enabled(port, true);
                        warn!(cause = cause.as_str(), "event tap re-enabled after disable");
                    }
                    return None;
                }
                TapSignal::Key(kind) => {
                    let key_code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                    let modifiers = Modifiers::from_cg_flags(event.get_flags());
                    if let Some(edge) = filter.borrow_mut().observe(kind, key_code, modifiers) {
                        debug!(event = edge.as_str(), "event tap hotkey edge");
                        sink(edge, SOURCE_NAME);
                    }
                }
                TapSignal::Other => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
            ],
            callback,
        )
        .map_err(|()| HotkeyError::TapCreation("CGEventTapCreate returned null".to_owned()))?;

        let source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|()| HotkeyError::TapCreation("run loop source creation failed".to_owned()))?;

        let run_loop = CFRunLoop::get_current();
        // SAFETY: kCFRunLoopCommonModes is an immutable CoreFoundation constant.
        run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });
        port_slot.replace(Some(tap.mach_port.clone()));
        tap.enable();

        info!(
            key_code = self.spec.virtual_code,
            hotkey = %self.spec,
            "event tap started"
        );

        self.tap = Some(tap);
        self.source = Some(source);
        self.run_loop = Some(run_loop);
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

impl Drop for EventTapBackend {
    fn drop(&mut self) {
        let Some(tap) = self.tap.take() else {
            return;
        };
        set_tap_enabled(&tap.mach_port, false);
        if let (Some(run_loop), Some(source)) = (self.run_loop.take(), self.source.take()) {
            // SAFETY: same constant the source was added with.
            run_loop.remove_source(&source, unsafe { kCFRunLoopCommonModes });
        }
        // SAFETY: the port is still retained by `tap`; invalidation only stops delivery.
        unsafe { CFMachPortInvalidate(tap.mach_port.as_concrete_TypeRef().cast::<c_void>()) };
        drop(tap);
        debug!("event tap torn down");
    }
}
