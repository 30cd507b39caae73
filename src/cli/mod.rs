//! Command-line interface
//!
//! The tray app takes no subcommands. Every flag has an environment fallback
//! so shortcuts and installers can configure it without editing arguments.

pub mod relaunch;

use clap::Parser;

use crate::controller::ExitMode;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const UNEXPECTED_FAILURE: i32 = 1;
}

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

/// Toggle Light/Dark Mode - flip the Windows appearance from the tray
///
/// Clicking the tray icon switches apps and system chrome between light and
/// dark. The icon follows changes made in Settings while it runs.
#[derive(Parser, Debug)]
#[command(name = "toggle-light-dark")]
#[command(author, version = VERSION, about, long_about = None)]
pub struct Cli {
    /// Launch token passed by the installer
    #[arg(hide = true)]
    pub launch_token: Option<String>,

    /// How clicks and the Exit menu item interact
    #[arg(long = "exit-mode", value_enum, env = "TOGGLE_THEME_EXIT_MODE", default_value_t = ExitMode::Legacy)]
    pub exit_mode: ExitMode,

    /// UI language (e.g. en, de, zh-TW); defaults to the system language
    #[arg(long, env = "TOGGLE_THEME_LANG")]
    pub lang: Option<String>,

    /// Don't follow appearance changes made outside the app
    #[arg(long = "no-watch", env = "TOGGLE_THEME_NO_WATCH")]
    pub no_watch: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit machine-readable logs (JSON) to stderr
    #[arg(long = "json-output")]
    pub json_output: bool,
}

impl Cli {
    /// Whether this process was started only to hand off to a fresh copy
    pub fn is_relaunch_request(&self) -> bool {
        self.launch_token.as_deref() == Some(relaunch::RELAUNCH_SENTINEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["toggle-light-dark"]).unwrap();
        assert_eq!(cli.exit_mode, ExitMode::Legacy);
        assert!(cli.lang.is_none());
        assert!(!cli.no_watch);
        assert!(!cli.is_relaunch_request());
    }

    #[test]
    fn test_installer_sentinel() {
        let cli = Cli::try_parse_from(["toggle-light-dark", "INSTALLER"]).unwrap();
        assert!(cli.is_relaunch_request());

        let cli = Cli::try_parse_from(["toggle-light-dark", "installer"]).unwrap();
        assert!(!cli.is_relaunch_request());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "toggle-light-dark",
            "--exit-mode",
            "single",
            "--lang",
            "ja",
            "--no-watch",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.exit_mode, ExitMode::Single);
        assert_eq!(cli.lang.as_deref(), Some("ja"));
        assert!(cli.no_watch);
        assert!(cli.verbose);
    }

    #[test]
    fn test_rejects_unknown_exit_mode() {
        assert!(Cli::try_parse_from(["toggle-light-dark", "--exit-mode", "sometimes"]).is_err());
    }
}
