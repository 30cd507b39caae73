//! User-visible messages shown before the tray icon exists

pub const APP_TITLE: &str = "Toggle Light/Dark Mode";

#[cfg(windows)]
pub fn show_message(text: &str) {
    use windows::core::HSTRING;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONINFORMATION, MB_OK};

    unsafe {
        MessageBoxW(
            HWND::default(),
            &HSTRING::from(text),
            &HSTRING::from(APP_TITLE),
            MB_OK | MB_ICONINFORMATION,
        );
    }
}

#[cfg(not(windows))]
pub fn show_message(text: &str) {
    eprintln!("{}: {}", APP_TITLE, text);
}
