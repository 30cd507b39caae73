//! Toggle controller
//!
//! Central coordination point between the tray indicator, the appearance
//! store and the change watcher. User activations and watcher callbacks both
//! run their read-modify-write sequence under one lock, so the indicator can
//! never settle on a mode that disagrees with the store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::appearance::{AppearanceMode, AppearanceStore};
use crate::labels::{self, Labels};
use crate::refresh::RefreshBroadcaster;
use crate::watcher::{ChangeCallback, ChangeWatcher};

/// Action the indicator currently offers (the opposite of the current mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorAction {
    /// Current mode is dark; clicking switches to light
    ShowLightAction,
    /// Current mode is light (or unknown); clicking switches to dark
    ShowDarkAction,
}

impl IndicatorAction {
    pub fn for_mode(mode: AppearanceMode) -> Self {
        match mode.effective() {
            AppearanceMode::Dark => IndicatorAction::ShowLightAction,
            _ => IndicatorAction::ShowDarkAction,
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            IndicatorAction::ShowLightAction => labels::SWITCH_TO_LIGHT_MODE,
            IndicatorAction::ShowDarkAction => labels::SWITCH_TO_DARK_MODE,
        }
    }
}

/// Mouse button that clicked the indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickButton {
    Left,
    Right,
    Middle,
}

/// How the exit menu item interacts with indicator clicks.
///
/// Opening the tray menu takes a right click. In `Legacy` mode any click
/// toggles, so reaching "Exit" has already toggled once, and exit writes the
/// opposite of the current value to undo it. `Single` toggles on left click
/// only and exit leaves the store alone. Both leave the persisted mode where
/// it was before the menu was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExitMode {
    #[default]
    Legacy,
    Single,
}

impl ExitMode {
    pub fn activates_on(&self, button: ClickButton) -> bool {
        match self {
            ExitMode::Legacy => true,
            ExitMode::Single => button == ClickButton::Left,
        }
    }

    pub fn reverts_on_exit(&self) -> bool {
        matches!(self, ExitMode::Legacy)
    }
}

/// Handle to the visible indicator
pub trait Indicator: Send {
    fn show(&mut self, action: IndicatorAction, label: &str);
    fn dispose(&mut self);
}

struct ControllerState {
    store: Box<dyn AppearanceStore>,
    refresher: Box<dyn RefreshBroadcaster>,
    indicator: Option<Box<dyn Indicator>>,
    labels: Labels,
    action: Option<IndicatorAction>,
}

impl ControllerState {
    /// Point the indicator at `mode`; no-op once the indicator is gone
    fn apply(&mut self, mode: AppearanceMode) {
        let action = IndicatorAction::for_mode(mode);
        let Some(indicator) = self.indicator.as_mut() else {
            return;
        };
        if self.action == Some(action) {
            return;
        }
        self.action = Some(action);
        indicator.show(action, self.labels.get(action.label_key()));
        tracing::debug!("Indicator now offers {:?} (mode {})", action, mode);
    }

    fn write_and_refresh(&mut self, target: AppearanceMode) -> bool {
        let written = match self.store.write(target) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to write appearance {}: {}", target, e);
                false
            }
        };
        self.refresher.refresh_all();
        written
    }

    fn dispose_indicator(&mut self) {
        if let Some(mut indicator) = self.indicator.take() {
            indicator.dispose();
        }
        self.action = None;
    }
}

/// Owns the watcher and drives the indicator
pub struct ToggleController {
    state: Mutex<ControllerState>,
    // Separate lock: stopping joins the notification thread, which may be
    // waiting on `state`
    watcher: Mutex<Option<Box<dyn ChangeWatcher>>>,
    exit_mode: ExitMode,
}

impl ToggleController {
    pub fn new(
        store: Box<dyn AppearanceStore>,
        refresher: Box<dyn RefreshBroadcaster>,
        indicator: Box<dyn Indicator>,
        watcher: Box<dyn ChangeWatcher>,
        labels: Labels,
        exit_mode: ExitMode,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ControllerState {
                store,
                refresher,
                indicator: Some(indicator),
                labels,
                action: None,
            }),
            watcher: Mutex::new(Some(watcher)),
            exit_mode,
        })
    }

    pub fn exit_mode(&self) -> ExitMode {
        self.exit_mode
    }

    /// Start watching for external changes and show the initial state.
    ///
    /// Returns whether external changes will be tracked; false means degraded
    /// mode (toggling still works).
    pub fn start(self: &Arc<Self>) -> bool {
        let weak = Arc::downgrade(self);
        let on_change: ChangeCallback = Arc::new(move || {
            if let Some(controller) = weak.upgrade() {
                controller.on_external_change();
            }
        });

        // `start` returns once the subscription is armed, so a change
        // before the first read is not lost
        let watching = self
            .lock_watcher()
            .as_mut()
            .map(|watcher| watcher.start(on_change))
            .unwrap_or(false);

        let mut state = self.lock_state();
        let mode = state.store.read();
        tracing::info!("Initial appearance: {}", mode);
        state.apply(mode);

        watching
    }

    /// User activated the indicator: switch away from the live mode.
    ///
    /// Returns the mode the indicator now reflects: the target on success,
    /// the re-read store value if the write failed, `None` once torn down.
    pub fn activate(&self) -> Option<AppearanceMode> {
        let mut state = self.lock_state();
        state.indicator.as_ref()?;

        // Re-read: an external change may have landed since the last update
        let current = state.store.read();
        let target = current.opposite();
        tracing::info!("Toggling appearance {} -> {}", current.effective(), target);

        let shown = if state.write_and_refresh(target) {
            target
        } else {
            state.store.read()
        };
        state.apply(shown);
        Some(shown)
    }

    /// Watcher callback: follow the store without writing to it
    pub fn on_external_change(&self) {
        let mut state = self.lock_state();
        if state.indicator.is_none() {
            return;
        }
        let mode = state.store.read();
        tracing::debug!("External appearance change observed: {}", mode);
        state.apply(mode);
    }

    /// Controlled exit from the tray menu
    pub fn exit(&self) {
        self.stop_watcher();

        let mut state = self.lock_state();
        if state.indicator.is_none() {
            return;
        }

        if self.exit_mode.reverts_on_exit() {
            let current = state.store.read();
            let target = current.opposite();
            tracing::info!("Reverting appearance on exit: {} -> {}", current.effective(), target);
            state.write_and_refresh(target);
        }

        state.dispose_indicator();
        tracing::info!("Controller shut down");
    }

    /// Abnormal termination: release the indicator and the subscription only.
    ///
    /// Never blocks, so it is safe from a panic hook on any thread.
    pub fn teardown(&self) {
        // The panicking thread may hold `state`, so never join here
        match self.watcher.try_lock() {
            Ok(mut watcher) => cancel_taken(watcher.take()),
            Err(TryLockError::Poisoned(poisoned)) => cancel_taken(poisoned.into_inner().take()),
            Err(TryLockError::WouldBlock) => tracing::warn!("Watcher busy during teardown"),
        }

        match self.state.try_lock() {
            Ok(mut state) => state.dispose_indicator(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().dispose_indicator(),
            Err(TryLockError::WouldBlock) => tracing::warn!("Indicator busy during teardown"),
        }
    }

    /// Action currently offered, `None` once torn down
    pub fn action(&self) -> Option<IndicatorAction> {
        self.lock_state().action
    }

    pub fn is_watching(&self) -> bool {
        self.lock_watcher()
            .as_ref()
            .map(|watcher| watcher.is_started())
            .unwrap_or(false)
    }

    pub fn is_torn_down(&self) -> bool {
        self.lock_state().indicator.is_none()
    }

    /// Take the watcher out under the lock and stop it outside, so a
    /// callback waiting on `state` can finish
    fn stop_watcher(&self) {
        let watcher = self.lock_watcher().take();
        stop_taken(watcher);
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_watcher(&self) -> MutexGuard<'_, Option<Box<dyn ChangeWatcher>>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stop_taken(watcher: Option<Box<dyn ChangeWatcher>>) {
    if let Some(mut watcher) = watcher {
        if let Err(e) = watcher.stop() {
            tracing::warn!("Error stopping change watcher: {}", e);
        }
    }
}

fn cancel_taken(watcher: Option<Box<dyn ChangeWatcher>>) {
    if let Some(mut watcher) = watcher {
        watcher.cancel();
    }
}
