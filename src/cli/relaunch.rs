//! Installer hand-off
//!
//! Installers start the app elevated and wait for it. Passing the sentinel
//! makes the process start a detached copy of itself and return at once.

use anyhow::Context;
use std::process::Command;

pub const RELAUNCH_SENTINEL: &str = "INSTALLER";

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;

/// Spawn the current executable without arguments
pub fn relaunch_detached() -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let mut command = Command::new(&exe);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(DETACHED_PROCESS);
    }

    let child = command
        .spawn()
        .with_context(|| format!("Failed to relaunch {}", exe.display()))?;
    tracing::info!("Relaunched as process {}", child.id());
    Ok(())
}
