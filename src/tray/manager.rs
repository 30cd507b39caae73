//! System tray manager
//!
//! The tray icon is `!Send` and lives on the event loop thread. The
//! controller reaches it through [`TrayIndicator`], which forwards commands
//! over the event loop proxy; commands are applied in the order they were sent.

use tray_icon::{
    menu::{Menu, MenuEvent, MenuId, MenuItem},
    Icon, TrayIcon, TrayIconBuilder, TrayIconEvent,
};
use winit::event_loop::EventLoopProxy;

use super::icon::{render_action_icon, ICON_SIZE};
use crate::controller::{Indicator, IndicatorAction};
use crate::labels::{self, Labels};

/// Events delivered to the winit event loop
#[derive(Debug)]
pub enum AppEvent {
    Tray(TrayIconEvent),
    Menu(MenuEvent),
    Indicator(IndicatorCommand),
}

/// Indicator mutation requested by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorCommand {
    Show {
        action: IndicatorAction,
        label: String,
    },
    Dispose,
}

/// Owns the tray icon on the event loop thread
pub struct TrayManager {
    tray_icon: Option<TrayIcon>,
    exit_id: MenuId,
}

impl TrayManager {
    /// Create the tray icon with its single "exit" menu entry.
    ///
    /// Starts out offering "switch to dark"; the controller's first update
    /// replaces it with the live state.
    pub fn new(labels: &Labels) -> anyhow::Result<Self> {
        let menu = Menu::new();
        let exit_item = MenuItem::new(labels.get(labels::EXIT), true, None);
        menu.append(&exit_item)?;

        let initial = IndicatorAction::ShowDarkAction;
        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_menu_on_left_click(false)
            .with_tooltip(labels.get(initial.label_key()))
            .with_icon(action_icon(initial)?)
            .build()?;

        Ok(Self {
            tray_icon: Some(tray_icon),
            exit_id: exit_item.id().clone(),
        })
    }

    pub fn apply(&mut self, command: IndicatorCommand) {
        match command {
            IndicatorCommand::Show { action, label } => self.show(action, &label),
            IndicatorCommand::Dispose => self.dispose(),
        }
    }

    fn show(&self, action: IndicatorAction, label: &str) {
        let Some(tray_icon) = self.tray_icon.as_ref() else {
            return;
        };
        match action_icon(action) {
            Ok(icon) => {
                if let Err(e) = tray_icon.set_icon(Some(icon)) {
                    tracing::warn!("Failed to set tray icon: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to render tray icon: {}", e),
        }
        if let Err(e) = tray_icon.set_tooltip(Some(label)) {
            tracing::warn!("Failed to set tray tooltip: {}", e);
        }
    }

    /// Hide first so the icon disappears immediately, then release it
    pub fn dispose(&mut self) {
        if let Some(tray_icon) = self.tray_icon.take() {
            let _ = tray_icon.set_visible(false);
        }
    }

    pub fn is_exit(&self, event: &MenuEvent) -> bool {
        event.id == self.exit_id
    }
}

fn action_icon(action: IndicatorAction) -> anyhow::Result<Icon> {
    let rgba = render_action_icon(action).into_raw();
    Ok(Icon::from_rgba(rgba, ICON_SIZE, ICON_SIZE)?)
}

/// Controller-side handle to the tray icon
pub struct TrayIndicator {
    proxy: EventLoopProxy<AppEvent>,
}

impl TrayIndicator {
    pub fn new(proxy: EventLoopProxy<AppEvent>) -> Self {
        Self { proxy }
    }

    fn send(&self, command: IndicatorCommand) {
        if self.proxy.send_event(AppEvent::Indicator(command)).is_err() {
            tracing::debug!("Event loop closed; indicator update dropped");
        }
    }
}

impl Indicator for TrayIndicator {
    fn show(&mut self, action: IndicatorAction, label: &str) {
        self.send(IndicatorCommand::Show {
            action,
            label: label.to_string(),
        });
    }

    fn dispose(&mut self) {
        self.send(IndicatorCommand::Dispose);
    }
}
