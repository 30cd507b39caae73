//! Tray application event loop
//!
//! winit drives the Win32 message pump the tray icon needs. Tray clicks, menu
//! selections and indicator updates from other threads all arrive as
//! [`AppEvent`]s through the loop's proxy.

use std::sync::{Arc, Weak};

use anyhow::Context;
use tray_icon::menu::MenuEvent;
use tray_icon::{MouseButton, MouseButtonState, TrayIconEvent};
use winit::application::ApplicationHandler;
use winit::event::{StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use crate::appearance::registry::RegistryAppearanceStore;
use crate::controller::{ClickButton, ExitMode, ToggleController};
use crate::labels::Labels;
use crate::refresh::shell::ShellRefresher;
use crate::tray::{AppEvent, TrayIndicator, TrayManager};
use crate::watcher::registry::registry_change_watcher;
use crate::watcher::{ChangeWatcher, WatchSubscription};

/// Runtime options gathered from the command line
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub exit_mode: ExitMode,
    pub watch: bool,
}

struct App {
    controller: Arc<ToggleController>,
    labels: Labels,
    tray: Option<TrayManager>,
    error: Option<anyhow::Error>,
}

impl App {
    fn on_tray_event(&self, event: TrayIconEvent) {
        let TrayIconEvent::Click {
            button,
            button_state: MouseButtonState::Up,
            ..
        } = event
        else {
            return;
        };

        let button = match button {
            MouseButton::Left => ClickButton::Left,
            MouseButton::Right => ClickButton::Right,
            MouseButton::Middle => ClickButton::Middle,
        };
        if self.controller.exit_mode().activates_on(button) {
            self.controller.activate();
        }
    }

    fn on_menu_event(&mut self, event_loop: &ActiveEventLoop, event: MenuEvent) {
        let is_exit = self.tray.as_ref().is_some_and(|tray| tray.is_exit(&event));
        if !is_exit {
            return;
        }

        tracing::info!("Exit requested from tray menu");
        self.controller.exit();
        if let Some(mut tray) = self.tray.take() {
            tray.dispose();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn new_events(&mut self, event_loop: &ActiveEventLoop, cause: StartCause) {
        if cause != StartCause::Init {
            return;
        }

        // The tray icon must be created once the loop is running
        match TrayManager::new(&self.labels) {
            Ok(tray) => self.tray = Some(tray),
            Err(e) => {
                self.error = Some(e.context("Failed to create tray icon"));
                self.controller.teardown();
                event_loop.exit();
                return;
            }
        }

        if !self.controller.start() {
            tracing::warn!("Not watching for appearance changes; the icon may go stale");
        }
    }

    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, _event: WindowEvent) {}

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Tray(event) => self.on_tray_event(event),
            AppEvent::Menu(event) => self.on_menu_event(event_loop, event),
            AppEvent::Indicator(command) => {
                if let Some(tray) = self.tray.as_mut() {
                    tray.apply(command);
                }
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // No-op after a controlled exit
        self.controller.teardown();
        self.tray = None;
    }
}

/// Run the tray app until the user picks Exit
pub fn run(labels: Labels, options: AppOptions) -> anyhow::Result<()> {
    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let proxy = event_loop.create_proxy();
    let tray_proxy = proxy.clone();
    TrayIconEvent::set_event_handler(Some(move |event| {
        let _ = tray_proxy.send_event(AppEvent::Tray(event));
    }));
    let menu_proxy = proxy.clone();
    MenuEvent::set_event_handler(Some(move |event| {
        let _ = menu_proxy.send_event(AppEvent::Menu(event));
    }));

    let watcher: Box<dyn ChangeWatcher> = if options.watch {
        Box::new(registry_change_watcher())
    } else {
        tracing::info!("External change tracking disabled");
        Box::new(WatchSubscription::disabled())
    };

    let controller = ToggleController::new(
        Box::new(RegistryAppearanceStore::new()),
        Box::new(ShellRefresher::new()),
        Box::new(TrayIndicator::new(proxy)),
        watcher,
        labels.clone(),
        options.exit_mode,
    );
    install_panic_hook(Arc::downgrade(&controller));

    let mut app = App {
        controller,
        labels,
        tray: None,
        error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Release the indicator and the subscription before the default hook runs
fn install_panic_hook(controller: Weak<ToggleController>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(controller) = controller.upgrade() {
            controller.teardown();
        }
        default_hook(info);
    }));
}
