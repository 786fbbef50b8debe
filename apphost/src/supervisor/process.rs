//! Child process spawning and signalling

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::errors::PlatformError;
use crate::models::app::Application;

/// Spawn the release's entry point for an application.
///
/// The child runs in the release directory with the application's
/// environment, in its own process group so that signals reach everything
/// it forks.
pub fn spawn(app: &Application, release: &Path, entry_point: &str) -> Result<Child, PlatformError> {
    let program = release.join(entry_point);
    if !program.is_file() {
        return Err(PlatformError::ProcessError(format!(
            "Entry point {} does not exist",
            program.display()
        )));
    }

    let mut cmd = Command::new(&program);
    cmd.current_dir(release)
        .envs(app.process_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    debug!(app_id = %app.id, program = %program.display(), "Spawning application process");

    cmd.spawn().map_err(|e| {
        PlatformError::ProcessError(format!("Failed to spawn {}: {}", program.display(), e))
    })
}

/// Ask the process group led by `pid` to terminate
#[cfg(unix)]
pub fn terminate(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

/// Kill the process group led by `pid`
#[cfg(unix)]
pub fn force_kill(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => debug!(pid = pid, signal = %signal, "Signalled process group"),
        Err(nix::errno::Errno::ESRCH) => debug!(pid = pid, "Process group already gone"),
        Err(e) => tracing::warn!(pid = pid, signal = %signal, error = %e, "Failed to signal process group"),
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) {}

#[cfg(not(unix))]
pub fn force_kill(_pid: u32) {}
