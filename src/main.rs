#[cfg(target_os = "macos")]
fn main() -> anyhow::Result<()> {
    app::run()
}

#[cfg(not(target_os = "macos"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("openclaw-vox runs only on macOS")
}

#[cfg(target_os = "macos")]
#[allow(unsafe_code)]
mod app {
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::{Context, Result};
    use objc2::rc::Retained;
    use objc2::MainThreadMarker;
    use objc2_app_kit::{NSApplication, NSApplicationActivationPolicy, NSEventMask};
    use objc2_foundation::{NSDate, NSDefaultRunLoopMode, NSRunLoopMode};
    use tokio::sync::watch;
    use tracing::{info, warn};

    use openclaw_vox::agent::GatewayClient;
    use openclaw_vox::capture::CommandCapture;
    use openclaw_vox::config::Config;
    use openclaw_vox::input::keys::HotkeySpec;
    use openclaw_vox::input::registered::{GlobalHotkeyRegistrar, HotkeyRegistry};
    use openclaw_vox::input::selector::{BackendSelector, ReselectReason};
    use openclaw_vox::input::SystemBackends;
    use openclaw_vox::permissions::SystemPermissions;
    use openclaw_vox::present::LogPresenter;
    use openclaw_vox::session::{
        Collaborators, SessionController, SessionEvent, SessionHandle, SessionSnapshot,
    };
    use openclaw_vox::speech::CommandSpeaker;
    use openclaw_vox::telemetry;
    use openclaw_vox::tray::{MenuCommand, MenuModel, TrayManager};
    use openclaw_vox::wake::WakeDetector;

    // How long one pump waits for AppKit events; bounds hotkey and menu latency
    const PUMP_INTERVAL: f64 = 0.05;
    const PERMISSION_POLL: Duration = Duration::from_secs(2);
    const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

    type Selector = BackendSelector<SystemPermissions, SystemBackends>;

    pub fn run() -> Result<()> {
        let mut config = Config::load()?;
        telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
        info!(version = env!("CARGO_PKG_VERSION"), "openclaw-vox starting");

        let mtm = MainThreadMarker::new().context("must start on the main thread")?;
        let app = NSApplication::sharedApplication(mtm);
        app.setActivationPolicy(NSApplicationActivationPolicy::Accessory);
        // SAFETY: main thread (checked above); the mode constant is immutable
        let mode = unsafe {
            app.finishLaunching();
            NSDefaultRunLoopMode
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("vox-worker")
            .build()
            .context("failed to build async runtime")?;
        let _runtime_guard = runtime.enter();

        // Session
        let (handle, inbox) = SessionHandle::channel();
        let agent = GatewayClient::new(&config.gateway, &config.agent.session_id)
            .context("invalid gateway configuration")?;
        let controller = SessionController::new(
            handle.clone(),
            Collaborators {
                capture: Arc::new(CommandCapture::new(&config.capture, handle.transcript_sink())),
                speech: Arc::new(CommandSpeaker::spawn(&config.speech)),
                agent: Arc::new(agent),
                presenter: Box::new(LogPresenter::default()),
            },
            &config.session,
            config.agent.auto_speak,
        );
        let snapshot = controller.subscribe();
        let session_task = runtime.spawn(controller.run(inbox));

        // Hotkey
        let spec = HotkeySpec::from_config(&config.hotkey).context("invalid hotkey")?;
        let registrar = GlobalHotkeyRegistrar::new().context("hotkey manager unavailable")?;
        let registry = Rc::new(HotkeyRegistry::new(Box::new(registrar)));
        let mut selector = BackendSelector::new(
            SystemPermissions,
            SystemBackends::new(registry),
            spec,
            handle.hotkey_sink(),
        );
        selector.reconfigure(ReselectReason::Startup);

        let mut tray = TrayManager::new(menu_model(&config, &selector, &snapshot))?;
        let mut wake = WakeDetector::default();
        let mut last_permission_poll = Instant::now();

        info!(hotkey = %selector.spec(), backend = %selector.label(), "ready");

        loop {
            pump_events(&app, mode);

            if let Some(command) = TrayManager::poll_events() {
                info!(?command, "menu command");
                match command {
                    MenuCommand::RequestAccess => {
                        selector.request_access();
                    }
                    MenuCommand::TestConnection => handle.post(SessionEvent::TestConnection),
                    MenuCommand::ToggleRecording => handle.post(SessionEvent::ToggleRecording),
                    MenuCommand::ShowOverlay => handle.post(SessionEvent::ShowOverlay),
                    MenuCommand::Dismiss => handle.post(SessionEvent::Dismiss),
                    MenuCommand::ToggleAutoSpeak => {
                        let enabled = config.toggle_auto_speak();
                        handle.post(SessionEvent::SetAutoSpeak(enabled));
                        if let Err(e) = config.save() {
                            warn!(error = %e, "failed to save auto-speak setting");
                        }
                    }
                    MenuCommand::Quit => break,
                }
            }

            if wake.poll() {
                selector.reconfigure(ReselectReason::Wake);
            }
            if last_permission_poll.elapsed() >= PERMISSION_POLL {
                last_permission_poll = Instant::now();
                selector.refresh_if_permission_changed();
            }

            if session_task.is_finished() {
                warn!("session loop ended unexpectedly");
                break;
            }

            if let Err(e) = tray.update(menu_model(&config, &selector, &snapshot)) {
                warn!(error = %e, "failed to refresh menu bar");
            }
        }

        info!("shutting down");
        handle.post(SessionEvent::Shutdown);
        if runtime
            .block_on(tokio::time::timeout(SHUTDOWN_GRACE, session_task))
            .is_err()
        {
            warn!("session loop did not stop in time");
        }
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
        Ok(())
    }

    /// Dispatch AppKit events (menu clicks, hotkeys, tap callbacks) for one interval
    fn pump_events(app: &Retained<NSApplication>, mode: &NSRunLoopMode) {
        let until = NSDate::dateWithTimeIntervalSinceNow(PUMP_INTERVAL);
        loop {
            // SAFETY: called on the main thread that owns `app`
            let event = unsafe {
                app.nextEventMatchingMask_untilDate_inMode_dequeue(
                    NSEventMask::Any,
                    Some(&until),
                    mode,
                    true,
                )
            };
            let Some(event) = event else {
                break;
            };
            app.sendEvent(&event);
        }
    }

    fn menu_model(
        config: &Config,
        selector: &Selector,
        snapshot: &watch::Receiver<SessionSnapshot>,
    ) -> MenuModel {
        MenuModel {
            agent_name: config.agent.name.clone(),
            hotkey: selector.spec().to_string(),
            backend: selector.label(),
            session: snapshot.borrow().clone(),
        }
    }
}
