//! Toggle Light/Dark Mode - Windows system tray app
//!
//! One click on the tray icon flips apps and system chrome between light and
//! dark. The icon tracks changes made elsewhere (Settings, other tools) while
//! it runs.

// Hide console window on Windows release builds
#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

// Modules below marked `allow(dead_code)` off Windows are only driven by the
// tray shell in `app`; elsewhere they are built for their tests.
#[cfg_attr(not(windows), allow(dead_code))]
mod appearance;
#[cfg(windows)]
mod app;
mod cli;
#[cfg_attr(not(windows), allow(dead_code))]
mod controller;
mod dialog;
mod labels;
mod logging;
#[cfg_attr(not(windows), allow(dead_code))]
mod refresh;
mod single_instance;
#[cfg_attr(not(windows), allow(dead_code))]
mod tray;
#[cfg_attr(not(windows), allow(dead_code))]
mod watcher;

use clap::Parser;
use cli::{exit_codes, Cli};
use labels::Labels;

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose, cli.json_output) {
        eprintln!("Failed to initialize logging: {}", e);
        return exit_codes::UNEXPECTED_FAILURE;
    }

    if cli.is_relaunch_request() {
        return match cli::relaunch::relaunch_detached() {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => {
                tracing::error!("{:#}", e);
                exit_codes::UNEXPECTED_FAILURE
            }
        };
    }

    let language = labels::resolve_language(cli.lang.as_deref());
    let labels = match Labels::load(language) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("{}", e);
            dialog::show_message(&format!("Cannot load language: {}", language));
            Labels::empty()
        }
    };
    tracing::debug!("Using language {:?}", labels.language());

    let _guard = match single_instance::SingleInstanceGuard::try_acquire() {
        Some(guard) => guard,
        None => {
            tracing::info!("Another instance is already running");
            dialog::show_message(labels.get(labels::PROGRAM_ALREADY_RUNNING));
            return exit_codes::SUCCESS;
        }
    };

    tracing::info!("Starting toggle-light-dark {}", cli::VERSION);
    match launch(&cli, labels) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            exit_codes::UNEXPECTED_FAILURE
        }
    }
}

#[cfg(windows)]
fn launch(cli: &Cli, labels: Labels) -> anyhow::Result<()> {
    app::run(
        labels,
        app::AppOptions {
            exit_mode: cli.exit_mode,
            watch: !cli.no_watch,
        },
    )
}

#[cfg(not(windows))]
fn launch(cli: &Cli, _labels: Labels) -> anyhow::Result<()> {
    tracing::debug!(exit_mode = ?cli.exit_mode, watch = !cli.no_watch, "Requested options");
    anyhow::bail!("The tray app is only available on Windows")
}
