//! Fallback backend: OS hotkey registration.
//!
//! The registration API delivers every hotkey through one process-wide
//! handler. [`HotkeyRegistry`] owns that handler and routes each event to the
//! backend instance whose id it carries. All registration and teardown
//! happen on the main thread; the map is behind a mutex only because the
//! handler must be `Send + Sync`.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info};

use crate::input::keys::HotkeySpec;
use crate::input::{HotkeyBackend, HotkeyError, HotkeyEvent, HotkeySink};

/// Source name reported with events from this backend
pub const SOURCE_NAME: &str = "registered-hotkey";

/// Process-wide handler: (registration id, edge)
pub type HotkeyDispatch = Box<dyn Fn(u32, HotkeyEvent) + Send + Sync>;

/// OS hotkey registration API
#[cfg_attr(test, mockall::automock)]
pub trait HotkeyRegistrar {
    /// Register the hotkey, returning the id its events will carry
    ///
    /// # Errors
    /// Returns error if the OS refuses the combination
    fn register(&self, spec: &HotkeySpec) -> Result<u32, HotkeyError>;

    /// Remove a registration
    ///
    /// # Errors
    /// Returns error if the OS reports a failure
    fn unregister(&self, id: u32) -> Result<(), HotkeyError>;

    /// Install the single process-wide pressed/released handler
    fn install_handler(&self, dispatch: HotkeyDispatch);
}

/// Id → callback routing table shared by all registered-hotkey backends
pub struct HotkeyRegistry {
    registrar: Box<dyn HotkeyRegistrar>,
    callbacks: Arc<Mutex<HashMap<u32, HotkeySink>>>,
    handler_installed: Cell<bool>,
}

impl HotkeyRegistry {
    /// Wrap a registrar; the OS handler is installed lazily on first registration
    #[must_use]
    pub fn new(registrar: Box<dyn HotkeyRegistrar>) -> Self {
        Self {
            registrar,
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            handler_installed: Cell::new(false),
        }
    }

    fn ensure_handler(&self) {
        if self.handler_installed.get() {
            return;
        }
        let callbacks = Arc::clone(&self.callbacks);
        self.registrar.install_handler(Box::new(move |id, event| {
            let sink = callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&id)
                .cloned();
            match sink {
                Some(sink) => sink(event, SOURCE_NAME),
                None => debug!(id, "hotkey event for unknown registration"),
            }
        }));
        self.handler_installed.set(true);
        info!("registered-hotkey handler installed");
    }

    /// Register `spec` and route its events to `sink`
    ///
    /// # Errors
    /// Returns error if the registrar refuses the hotkey
    pub fn register(&self, spec: &HotkeySpec, sink: HotkeySink) -> Result<u32, HotkeyError> {
        self.ensure_handler();
        let id = self.registrar.register(spec)?;
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sink);
        info!(id, hotkey = %spec, "hotkey registered");
        Ok(id)
    }

    /// Drop a registration and its callback; the shared handler stays installed
    pub fn unregister(&self, id: u32) {
        if let Err(e) = self.registrar.unregister(id) {
            error!(id, error = %e, "failed to unregister hotkey");
        }
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of live registrations
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registered-hotkey backend instance
pub struct RegisteredHotkeyBackend {
    registry: Rc<HotkeyRegistry>,
    spec: HotkeySpec,
    sink: HotkeySink,
    id: Option<u32>,
}

impl RegisteredHotkeyBackend {
    /// Create an unstarted backend sharing `registry`
    #[must_use]
    pub const fn new(registry: Rc<HotkeyRegistry>, spec: HotkeySpec, sink: HotkeySink) -> Self {
        Self {
            registry,
            spec,
            sink,
            id: None,
        }
    }
}

impl HotkeyBackend for RegisteredHotkeyBackend {
    fn start(&mut self) -> Result<(), HotkeyError> {
        if self.id.is_some() {
            return Ok(());
        }
        let id = self
            .registry
            .register(&self.spec, HotkeySink::clone(&self.sink))?;
        self.id = Some(id);
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

impl Drop for RegisteredHotkeyBackend {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.registry.unregister(id);
            debug!(id, "registered hotkey torn down");
        }
    }
}

/// Registrar backed by the `global-hotkey` crate
#[cfg(target_os = "macos")]
pub struct GlobalHotkeyRegistrar {
    manager: global_hotkey::GlobalHotKeyManager,
    registered: std::cell::RefCell<HashMap<u32, global_hotkey::hotkey::HotKey>>,
}

#[cfg(target_os = "macos")]
impl GlobalHotkeyRegistrar {
    /// Create the registrar; must run on the main thread
    ///
    /// # Errors
    /// Returns error if the hotkey manager cannot be created
    pub fn new() -> Result<Self, HotkeyError> {
        let manager = global_hotkey::GlobalHotKeyManager::new()
            .map_err(|e| HotkeyError::Registration(e.to_string()))?;
        Ok(Self {
            manager,
            registered: std::cell::RefCell::new(HashMap::new()),
        })
    }
}

#[cfg(target_os = "macos")]
impl HotkeyRegistrar for GlobalHotkeyRegistrar {
    fn register(&self, spec: &HotkeySpec) -> Result<u32, HotkeyError> {
        let hotkey = global_hotkey::hotkey::HotKey::new(
            Some(spec.modifiers.to_registration()),
            spec.registration_code()?,
        );
        self.manager
            .register(hotkey)
            .map_err(|e| HotkeyError::Registration(e.to_string()))?;
        let id = hotkey.id();
        self.registered.borrow_mut().insert(id, hotkey);
        Ok(id)
    }

    fn unregister(&self, id: u32) -> Result<(), HotkeyError> {
        let Some(hotkey) = self.registered.borrow_mut().remove(&id) else {
            return Ok(());
        };
        self.manager
            .unregister(hotkey)
            .map_err(|e| HotkeyError::Registration(e.to_string()))
    }

    fn install_handler(&self, dispatch: HotkeyDispatch) {
        use global_hotkey::{GlobalHotKeyEvent, HotKeyState};

        GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
            let edge = match event.state {
                HotKeyState::Pressed => HotkeyEvent::Down,
                HotKeyState::Released => HotkeyEvent::Up,
            };
            dispatch(event.id, edge);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Registrar that hands out sequential ids and keeps the handler for tests to fire
    #[derive(Default)]
    struct FakeRegistrar {
        next_id: AtomicU32,
        handler: Arc<Mutex<Option<HotkeyDispatch>>>,
        installs: Arc<AtomicU32>,
        unregistered: Arc<Mutex<Vec<u32>>>,
    }

    impl HotkeyRegistrar for FakeRegistrar {
        fn register(&self, _spec: &HotkeySpec) -> Result<u32, HotkeyError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 100)
        }

        fn unregister(&self, id: u32) -> Result<(), HotkeyError> {
            self.unregistered.lock().unwrap().push(id);
            Ok(())
        }

        fn install_handler(&self, dispatch: HotkeyDispatch) {
            self.installs.fetch_add(1, Ordering::SeqCst);
            *self.handler.lock().unwrap() = Some(dispatch);
        }
    }

    fn spec() -> HotkeySpec {
        HotkeySpec::parse("Space", &["Control".to_owned(), "Option".to_owned()]).unwrap()
    }

    fn recording_sink() -> (HotkeySink, Arc<Mutex<Vec<(HotkeyEvent, &'static str)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: HotkeySink = Arc::new(move |event, source| {
            seen_clone.lock().unwrap().push((event, source));
        });
        (sink, seen)
    }

    #[test]
    fn test_handler_installed_once_and_dispatches_by_id() {
        let registrar = FakeRegistrar::default();
        let handler = Arc::clone(&registrar.handler);
        let installs = Arc::clone(&registrar.installs);
        let registry = Rc::new(HotkeyRegistry::new(Box::new(registrar)));

        let (sink_a, seen_a) = recording_sink();
        let (sink_b, seen_b) = recording_sink();
        let mut a = RegisteredHotkeyBackend::new(Rc::clone(&registry), spec(), sink_a);
        let mut b = RegisteredHotkeyBackend::new(Rc::clone(&registry), spec(), sink_b);
        a.start().unwrap();
        b.start().unwrap();

        assert_eq!(installs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 2);

        let guard = handler.lock().unwrap();
        let dispatch = guard.as_ref().unwrap();
        dispatch(101, HotkeyEvent::Down);
        dispatch(101, HotkeyEvent::Up);
        dispatch(999, HotkeyEvent::Down);

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(
            *seen_b.lock().unwrap(),
            vec![
                (HotkeyEvent::Down, SOURCE_NAME),
                (HotkeyEvent::Up, SOURCE_NAME)
            ]
        );
    }

    #[test]
    fn test_drop_unregisters_and_keeps_handler() {
        let registrar = FakeRegistrar::default();
        let unregistered = Arc::clone(&registrar.unregistered);
        let handler = Arc::clone(&registrar.handler);
        let registry = Rc::new(HotkeyRegistry::new(Box::new(registrar)));

        let (sink, seen) = recording_sink();
        let mut backend = RegisteredHotkeyBackend::new(Rc::clone(&registry), spec(), sink);
        backend.start().unwrap();
        drop(backend);

        assert!(registry.is_empty());
        assert_eq!(*unregistered.lock().unwrap(), vec![100]);

        // Handler survives; events for the removed id go nowhere
        let guard = handler.lock().unwrap();
        guard.as_ref().unwrap()(100, HotkeyEvent::Down);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_registration_failure_leaves_no_callback() {
        let mut registrar = MockHotkeyRegistrar::new();
        registrar.expect_install_handler().times(1).return_const(());
        registrar
            .expect_register()
            .returning(|_| Err(HotkeyError::Registration("combination in use".to_owned())));
        registrar.expect_unregister().never();

        let registry = Rc::new(HotkeyRegistry::new(Box::new(registrar)));
        let (sink, _seen) = recording_sink();
        let mut backend = RegisteredHotkeyBackend::new(Rc::clone(&registry), spec(), sink);

        let result = backend.start();
        assert!(matches!(result, Err(HotkeyError::Registration(_))));
        assert!(registry.is_empty());
        drop(backend);
    }

    #[test]
    fn test_source_name() {
        let registry = Rc::new(HotkeyRegistry::new(Box::new(FakeRegistrar::default())));
        let (sink, _) = recording_sink();
        let backend = RegisteredHotkeyBackend::new(registry, spec(), sink);
        assert_eq!(backend.source_name(), "registered-hotkey");
    }
}
