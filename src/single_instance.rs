//! Single instance detection using a named mutex
//!
//! The mutex lives in the session namespace, so each signed-in user can run
//! their own copy.

#[cfg(windows)]
use windows::core::PCWSTR;
#[cfg(windows)]
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE};
#[cfg(windows)]
use windows::Win32::System::Threading::{CreateMutexW, ReleaseMutex};

/// Held for the life of the process; dropping releases the mutex.
///
/// Detection uses a named mutex, not a scan of running processes for our
/// executable name. Two copies starting together cannot both win, a renamed
/// binary is still detected, and the OS drops the mutex if the process dies.
pub struct SingleInstanceGuard {
    // `None` when the mutex could not be created and we run unguarded
    #[cfg(windows)]
    handle: Option<HANDLE>,
    #[cfg(not(windows))]
    _marker: std::marker::PhantomData<()>,
}

impl SingleInstanceGuard {
    const MUTEX_NAME: &'static str = "Local\\ToggleLightDarkMode_SingleInstance";

    /// `None` if another instance already holds the mutex
    #[cfg(windows)]
    pub fn try_acquire() -> Option<Self> {
        let wide_name: Vec<u16> = Self::MUTEX_NAME
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();

        unsafe {
            match CreateMutexW(None, true, PCWSTR(wide_name.as_ptr())) {
                Ok(handle) => {
                    if GetLastError() == ERROR_ALREADY_EXISTS {
                        let _ = CloseHandle(handle);
                        None
                    } else {
                        Some(Self {
                            handle: Some(handle),
                        })
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to create single instance mutex: {}", e);
                    Some(Self { handle: None })
                }
            }
        }
    }

    #[cfg(not(windows))]
    pub fn try_acquire() -> Option<Self> {
        Some(Self {
            _marker: std::marker::PhantomData,
        })
    }
}

#[cfg(windows)]
impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe {
                let _ = ReleaseMutex(handle);
                let _ = CloseHandle(handle);
            }
        }
    }
}
