//! System tray module
//!
//! Icon rendering for the indicator, and (on Windows) the tray icon itself

pub mod icon;
#[cfg(windows)]
pub mod manager;

#[cfg(windows)]
pub use manager::{AppEvent, IndicatorCommand, TrayIndicator, TrayManager};
