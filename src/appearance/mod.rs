//! Appearance store
//!
//! Reads and writes the two persisted light/dark flags:
//! - `AppsUseLightTheme` (application level)
//! - `SystemUsesLightTheme` (system level: taskbar, start menu, tray)

#[cfg(windows)]
pub mod registry;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[cfg(windows)]
pub use registry::RegistryAppearanceStore;

/// Registry path of the appearance values, relative to the user hive
pub const PERSONALIZE_SUBKEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Themes\Personalize";

/// Application-level light flag
pub const APPS_USE_LIGHT_THEME: &str = "AppsUseLightTheme";

/// System-level light flag
pub const SYSTEM_USES_LIGHT_THEME: &str = "SystemUsesLightTheme";

/// OS-wide light/dark appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppearanceMode {
    Light,
    Dark,
    /// The store was unreadable or held something other than a DWORD.
    ///
    /// Every transition treats this as `Light` (see [`AppearanceMode::effective`]).
    #[default]
    Unknown,
}

impl AppearanceMode {
    /// Interpret a raw DWORD flag (`1` = light, `0` = dark)
    pub fn from_flag(value: u32) -> Self {
        match value {
            0 => AppearanceMode::Dark,
            1 => AppearanceMode::Light,
            // Windows only ever writes 0/1, but any non-zero is "light" to the shell
            _ => AppearanceMode::Light,
        }
    }

    /// The DWORD flag written for this mode
    pub fn flag(&self) -> u32 {
        match self.effective() {
            AppearanceMode::Dark => 0,
            _ => 1,
        }
    }

    /// Resolve `Unknown` to the documented default of `Light`
    pub fn effective(&self) -> Self {
        match self {
            AppearanceMode::Unknown => AppearanceMode::Light,
            other => *other,
        }
    }

    /// The mode a toggle switches to
    pub fn opposite(&self) -> Self {
        match self.effective() {
            AppearanceMode::Dark => AppearanceMode::Light,
            _ => AppearanceMode::Dark,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppearanceMode::Light => "light",
            AppearanceMode::Dark => "dark",
            AppearanceMode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AppearanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appearance store errors
#[derive(Debug, thiserror::Error)]
pub enum AppearanceError {
    #[error("Failed to open appearance key: {0}")]
    Open(#[source] std::io::Error),
    #[error("Failed to write {name}: {source}")]
    Write {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Live read/write access to the appearance flags.
///
/// Implementations never cache: external edits must be visible on the next read.
pub trait AppearanceStore: Send {
    /// Read the system-level flag. Never fails; unreadable values map to `Unknown`.
    fn read(&self) -> AppearanceMode;

    /// Write both flags, application level first. Not transactional.
    fn write(&mut self, mode: AppearanceMode) -> Result<(), AppearanceError>;
}

/// In-memory store used by tests and non-Windows builds.
///
/// Cloning shares the underlying values, so a clone can play the part of
/// "another process" editing the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryAppearanceStore {
    inner: std::sync::Arc<MemoryValues>,
}

#[derive(Debug, Default)]
struct MemoryValues {
    flags: Mutex<MemoryFlags>,
    writes: AtomicUsize,
}

#[derive(Debug, Default, Clone, Copy)]
struct MemoryFlags {
    apps: Option<u32>,
    system: Option<u32>,
    fail_system_write: bool,
}

impl MemoryAppearanceStore {
    /// Empty store: reads return `Unknown`
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with both flags set to `mode`
    pub fn with_mode(mode: AppearanceMode) -> Self {
        let store = Self::new();
        store.set_external(mode);
        store
    }

    /// Change both flags without counting a write (simulates another process)
    pub fn set_external(&self, mode: AppearanceMode) {
        let mut flags = self.lock();
        flags.apps = Some(mode.flag());
        flags.system = Some(mode.flag());
    }

    /// Make the second (system-level) write fail
    pub fn fail_system_write(&self, fail: bool) {
        self.lock().fail_system_write = fail;
    }

    /// Raw `(AppsUseLightTheme, SystemUsesLightTheme)` values
    pub fn flags(&self) -> (Option<u32>, Option<u32>) {
        let flags = self.lock();
        (flags.apps, flags.system)
    }

    /// Number of `write` calls made through the trait
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryFlags> {
        self.inner
            .flags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl AppearanceStore for MemoryAppearanceStore {
    fn read(&self) -> AppearanceMode {
        self.lock()
            .system
            .map(AppearanceMode::from_flag)
            .unwrap_or(AppearanceMode::Unknown)
    }

    fn write(&mut self, mode: AppearanceMode) -> Result<(), AppearanceError> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        let mut flags = self.lock();
        flags.apps = Some(mode.flag());
        if flags.fail_system_write {
            return Err(AppearanceError::Write {
                name: SYSTEM_USES_LIGHT_THEME,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
            });
        }
        flags.system = Some(mode.flag());
        Ok(())
    }
}
