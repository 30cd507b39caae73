//! Refresh broadcaster
//!
//! After the appearance flags are written, tell the shell so the taskbar,
//! desktop and already-open file browser windows repaint without waiting for
//! their own polling.

#[cfg(windows)]
pub mod shell;

#[cfg(windows)]
pub use shell::ShellRefresher;

/// Names the shell reports for file browser windows (older and newer Windows)
pub const FILE_BROWSER_NAMES: &[&str] = &["Windows Explorer", "File Explorer"];

/// Refresh errors
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Shell automation unavailable: {0}")]
    Unavailable(String),
    #[error("Shell window enumeration failed: {0}")]
    Enumerate(String),
    #[error("Shell window call failed: {0}")]
    Window(String),
}

/// One window exposed by the shell automation interface
pub trait ShellWindow {
    fn name(&self) -> Result<String, RefreshError>;
    fn refresh(&self) -> Result<(), RefreshError>;
}

/// Enumerates shell-owned windows
pub trait ShellAutomation {
    fn windows(&self) -> Result<Vec<Box<dyn ShellWindow>>, RefreshError>;
}

/// Refresh every shell window whose name matches one of `names`
/// (case-insensitive). Returns how many were refreshed.
///
/// A window that fails to report its name or to refresh is skipped; only a
/// failed enumeration is an error.
pub fn refresh_matching(
    automation: &dyn ShellAutomation,
    names: &[&str],
) -> Result<usize, RefreshError> {
    let mut refreshed = 0;
    for window in automation.windows()? {
        let name = match window.name() {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Skipping shell window without name: {}", e);
                continue;
            }
        };

        if !names.iter().any(|n| n.eq_ignore_ascii_case(name.trim())) {
            continue;
        }

        match window.refresh() {
            Ok(()) => refreshed += 1,
            Err(e) => tracing::debug!("Failed to refresh '{}': {}", name, e),
        }
    }
    Ok(refreshed)
}

/// Shell notification after an appearance write
pub trait RefreshBroadcaster: Send {
    /// System-wide "settings changed" notification. Fire-and-forget.
    fn broadcast_desktop_refresh(&self);

    /// Refresh open file browser windows
    fn refresh_open_file_browsers(&self) -> Result<usize, RefreshError>;

    /// Run both refreshes. Failures are logged and never reach the caller.
    fn refresh_all(&self) {
        self.broadcast_desktop_refresh();
        match self.refresh_open_file_browsers() {
            Ok(0) => {}
            Ok(count) => tracing::debug!("Refreshed {} file browser window(s)", count),
            Err(e) => tracing::warn!("File browser refresh skipped: {}", e),
        }
    }
}

/// Refresher for platforms without a shell to notify
#[derive(Debug, Default)]
pub struct NoopRefresher;

impl RefreshBroadcaster for NoopRefresher {
    fn broadcast_desktop_refresh(&self) {}

    fn refresh_open_file_browsers(&self) -> Result<usize, RefreshError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubWindow {
        name: Option<&'static str>,
        refreshes: Arc<AtomicUsize>,
        fail_refresh: bool,
    }

    impl ShellWindow for StubWindow {
        fn name(&self) -> Result<String, RefreshError> {
            self.name
                .map(str::to_string)
                .ok_or_else(|| RefreshError::Window("no name".into()))
        }

        fn refresh(&self) -> Result<(), RefreshError> {
            if self.fail_refresh {
                return Err(RefreshError::Window("refresh rejected".into()));
            }
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubAutomation {
        names: Vec<Option<&'static str>>,
        refreshes: Arc<AtomicUsize>,
        available: bool,
    }

    impl StubAutomation {
        fn new(names: &[Option<&'static str>]) -> Self {
            Self {
                names: names.to_vec(),
                refreshes: Arc::new(AtomicUsize::new(0)),
                available: true,
            }
        }
    }

    impl ShellAutomation for StubAutomation {
        fn windows(&self) -> Result<Vec<Box<dyn ShellWindow>>, RefreshError> {
            if !self.available {
                return Err(RefreshError::Unavailable("class not registered".into()));
            }
            Ok(self
                .names
                .iter()
                .map(|name| {
                    Box::new(StubWindow {
                        name: *name,
                        refreshes: self.refreshes.clone(),
                        fail_refresh: *name == Some("File Explorer "),
                    }) as Box<dyn ShellWindow>
                })
                .collect())
        }
    }

    #[test]
    fn test_refresh_only_file_browsers() {
        let automation = StubAutomation::new(&[
            Some("Windows Explorer"),
            Some("Internet Explorer"),
            Some("file explorer"),
            None,
        ]);
        let count = refresh_matching(&automation, FILE_BROWSER_NAMES).unwrap();
        assert_eq!(count, 2);
        assert_eq!(automation.refreshes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_window_refresh_is_skipped() {
        let automation = StubAutomation::new(&[Some("File Explorer "), Some("Windows Explorer")]);
        let count = refresh_matching(&automation, FILE_BROWSER_NAMES).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unavailable_automation_is_error() {
        let mut automation = StubAutomation::new(&[Some("Windows Explorer")]);
        automation.available = false;
        assert!(matches!(
            refresh_matching(&automation, FILE_BROWSER_NAMES),
            Err(RefreshError::Unavailable(_))
        ));
    }

    struct FailingRefresher {
        broadcasts: AtomicUsize,
    }

    impl RefreshBroadcaster for FailingRefresher {
        fn broadcast_desktop_refresh(&self) {
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
        }

        fn refresh_open_file_browsers(&self) -> Result<usize, RefreshError> {
            Err(RefreshError::Unavailable("no shell".into()))
        }
    }

    #[test]
    fn test_refresh_all_swallows_failures() {
        let refresher = FailingRefresher {
            broadcasts: AtomicUsize::new(0),
        };
        refresher.refresh_all();
        assert_eq!(refresher.broadcasts.load(Ordering::SeqCst), 1);
    }
}
