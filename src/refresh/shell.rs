//! Windows shell refresh
//!
//! Desktop broadcast through `SHChangeNotify` / `WM_SETTINGCHANGE`, and file
//! browser refresh through the `IShellWindows` automation object.

use windows::core::{Interface, HSTRING, VARIANT};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_APARTMENTTHREADED,
};
use windows::Win32::UI::Shell::{
    IShellWindows, IWebBrowser2, SHChangeNotify, ShellWindows, SHCNE_ASSOCCHANGED, SHCNF_FLUSH,
};
use windows::Win32::UI::WindowsAndMessaging::{
    SendMessageTimeoutW, HWND_BROADCAST, SMTO_ABORTIFHUNG, WM_SETTINGCHANGE,
};

use super::{
    refresh_matching, RefreshBroadcaster, RefreshError, ShellAutomation, ShellWindow,
    FILE_BROWSER_NAMES,
};

/// Upper bound for each top-level window to answer the settings broadcast
const BROADCAST_TIMEOUT_MS: u32 = 1000;

/// Refresher backed by the Windows shell
#[derive(Debug, Default)]
pub struct ShellRefresher;

impl ShellRefresher {
    pub fn new() -> Self {
        Self
    }
}

impl RefreshBroadcaster for ShellRefresher {
    fn broadcast_desktop_refresh(&self) {
        let area = HSTRING::from("ImmersiveColorSet");
        unsafe {
            SHChangeNotify(SHCNE_ASSOCCHANGED, SHCNF_FLUSH, None, None);
            let _ = SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                WPARAM(0),
                LPARAM(area.as_ptr() as isize),
                SMTO_ABORTIFHUNG,
                BROADCAST_TIMEOUT_MS,
                None,
            );
        }
    }

    fn refresh_open_file_browsers(&self) -> Result<usize, RefreshError> {
        let automation = ComShellAutomation::new()?;
        refresh_matching(&automation, FILE_BROWSER_NAMES)
    }
}

/// COM apartment entered for the lifetime of one refresh
struct ComApartment {
    initialized: bool,
}

impl ComApartment {
    fn enter() -> Self {
        // RPC_E_CHANGED_MODE: the thread already has an apartment we can use
        let initialized = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.is_ok();
        Self { initialized }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.initialized {
            unsafe { CoUninitialize() };
        }
    }
}

/// Typed binding to the `Shell.Application` window collection
struct ComShellAutomation {
    // Released before the apartment is left
    windows: IShellWindows,
    _apartment: ComApartment,
}

impl ComShellAutomation {
    fn new() -> Result<Self, RefreshError> {
        let apartment = ComApartment::enter();
        let windows: IShellWindows = unsafe { CoCreateInstance(&ShellWindows, None, CLSCTX_ALL) }
            .map_err(|e| RefreshError::Unavailable(e.to_string()))?;
        Ok(Self {
            windows,
            _apartment: apartment,
        })
    }
}

impl ShellAutomation for ComShellAutomation {
    fn windows(&self) -> Result<Vec<Box<dyn ShellWindow>>, RefreshError> {
        let count = unsafe { self.windows.Count() }
            .map_err(|e| RefreshError::Enumerate(e.to_string()))?;

        let mut windows: Vec<Box<dyn ShellWindow>> = Vec::new();
        for index in 0..count {
            let item = match unsafe { self.windows.Item(&VARIANT::from(index)) } {
                Ok(item) => item,
                Err(e) => {
                    tracing::debug!("Shell window {} vanished: {}", index, e);
                    continue;
                }
            };
            // Non-browser shell windows do not implement IWebBrowser2
            if let Ok(browser) = item.cast::<IWebBrowser2>() {
                windows.push(Box::new(BrowserWindow(browser)));
            }
        }
        Ok(windows)
    }
}

struct BrowserWindow(IWebBrowser2);

impl ShellWindow for BrowserWindow {
    fn name(&self) -> Result<String, RefreshError> {
        unsafe { self.0.Name() }
            .map(|name| name.to_string())
            .map_err(|e| RefreshError::Window(e.to_string()))
    }

    fn refresh(&self) -> Result<(), RefreshError> {
        unsafe { self.0.Refresh() }.map_err(|e| RefreshError::Window(e.to_string()))
    }
}
