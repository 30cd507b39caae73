//! Registry change source
//!
//! Watches the current user's Personalize key through `HKEY_USERS\<SID>`
//! rather than `HKEY_CURRENT_USER`, so the subscription is bound to the
//! user's hive and not to the per-process HKCU alias.

use std::ffi::c_void;
use std::sync::Arc;
use std::time::Duration;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    CloseHandle, LocalFree, HANDLE, HLOCAL, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows::Win32::Security::Authorization::ConvertSidToStringSidW;
use windows::Win32::Security::{GetTokenInformation, TokenUser, TOKEN_QUERY, TOKEN_USER};
use windows::Win32::System::Registry::{
    RegCloseKey, RegNotifyChangeKeyValue, RegOpenKeyExW, HKEY, HKEY_USERS, KEY_NOTIFY, KEY_READ,
    REG_NOTIFY_CHANGE_LAST_SET, REG_NOTIFY_CHANGE_NAME,
};
use windows::Win32::System::Threading::{
    CreateEventW, GetCurrentProcess, OpenProcessToken, WaitForSingleObject,
};

use super::{ChangeSource, WatchError, WatchSubscription};
use crate::appearance::PERSONALIZE_SUBKEY;

/// Watch subscription over the current user's appearance key
pub fn registry_change_watcher() -> WatchSubscription {
    WatchSubscription::new(
        "appearance",
        Arc::new(|| Ok(Box::new(RegistryChangeSource::open()?) as Box<dyn ChangeSource>)),
    )
}

/// String form (`S-1-5-21-...`) of the SID the process runs as
pub fn current_user_sid() -> Result<String, WatchError> {
    unsafe {
        let mut token = HANDLE::default();
        OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token)
            .map_err(|e| WatchError::Identity(e.to_string()))?;

        let sid = token_user_sid(token);
        let _ = CloseHandle(token);
        sid
    }
}

unsafe fn token_user_sid(token: HANDLE) -> Result<String, WatchError> {
    // First call only reports the buffer size
    let mut len = 0u32;
    let _ = GetTokenInformation(token, TokenUser, None, 0, &mut len);
    if len == 0 {
        return Err(WatchError::Identity("token has no user information".into()));
    }

    // u64 backing keeps TOKEN_USER aligned
    let mut buffer = vec![0u64; (len as usize).div_ceil(8)];
    GetTokenInformation(
        token,
        TokenUser,
        Some(buffer.as_mut_ptr() as *mut c_void),
        len,
        &mut len,
    )
    .map_err(|e| WatchError::Identity(e.to_string()))?;

    let user = &*(buffer.as_ptr() as *const TOKEN_USER);
    let mut sid_string = PWSTR::null();
    ConvertSidToStringSidW(user.User.Sid, &mut sid_string)
        .map_err(|e| WatchError::Identity(e.to_string()))?;

    let sid = sid_string
        .to_string()
        .map_err(|e| WatchError::Identity(e.to_string()));
    let _ = LocalFree(HLOCAL(sid_string.0 as *mut c_void));
    sid
}

/// Asynchronous `RegNotifyChangeKeyValue` bound to an auto-reset event.
///
/// The notification is tied to the thread that armed it, so the source must
/// live on the notification thread for its whole life.
struct RegistryChangeSource {
    key: HKEY,
    event: HANDLE,
}

impl RegistryChangeSource {
    fn open() -> Result<Self, WatchError> {
        let sid = current_user_sid()?;
        let path = format!("{}\\{}", sid, PERSONALIZE_SUBKEY);
        let path_wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();

        unsafe {
            let mut key = HKEY::default();
            RegOpenKeyExW(
                HKEY_USERS,
                PCWSTR(path_wide.as_ptr()),
                0,
                KEY_NOTIFY | KEY_READ,
                &mut key,
            )
            .ok()
            .map_err(|e| WatchError::Open(format!("HKEY_USERS\\{}: {}", path, e)))?;

            let event = match CreateEventW(None, false, false, PCWSTR::null()) {
                Ok(event) => event,
                Err(e) => {
                    let _ = RegCloseKey(key);
                    return Err(WatchError::Notify(e.to_string()));
                }
            };

            tracing::debug!("Opened HKEY_USERS\\{} for change notifications", path);
            Ok(Self { key, event })
        }
    }
}

impl ChangeSource for RegistryChangeSource {
    /// Each registration fires once
    fn arm(&mut self) -> Result<(), WatchError> {
        unsafe {
            RegNotifyChangeKeyValue(
                self.key,
                true,
                REG_NOTIFY_CHANGE_NAME | REG_NOTIFY_CHANGE_LAST_SET,
                self.event,
                true,
            )
            .ok()
            .map_err(|e| WatchError::Notify(e.to_string()))
        }
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, WatchError> {
        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        let status = unsafe { WaitForSingleObject(self.event, millis) };
        if status == WAIT_OBJECT_0 {
            Ok(true)
        } else if status == WAIT_TIMEOUT {
            Ok(false)
        } else {
            Err(WatchError::Notify(format!("wait failed: {:?}", status)))
        }
    }
}

impl Drop for RegistryChangeSource {
    fn drop(&mut self) {
        // Closing the key cancels any pending notification
        unsafe {
            let _ = RegCloseKey(self.key);
            let _ = CloseHandle(self.event);
        }
    }
}
