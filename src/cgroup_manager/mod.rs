//! Launching peer processes, inside a cgroup when the platform has them.

#[cfg(target_os = "linux")]
mod cgroup_manager_linux;

#[cfg(target_os = "linux")]
pub use cgroup_manager_linux::*;

#[cfg(not(target_os = "linux"))]
mod cgroup_manager_stub;

#[cfg(not(target_os = "linux"))]
pub use cgroup_manager_stub::*;

use std::process::{Child, Stdio};

use anyhow::Context;

/// Spawns `command` with all three standard streams piped, as the leader of a new process
/// group.
fn create_process(command: &str, args: &[String]) -> anyhow::Result<Child> {
    let mut cmd = std::process::Command::new(command);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn()
        .with_context(|| format!("command '{command}' not found"))
}

/// Sends SIGKILL to every process in `child`'s group, so that descendants holding its pipes
/// die with it.
#[cfg(unix)]
fn kill_process_group(child: &Child) -> anyhow::Result<()> {
    let status = std::process::Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", child.id())])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("Could not launch 'kill'")?;
    // fails once the whole group is already gone
    if !status.success() {
        tracing::trace!("kill -{} exited with {status}", child.id());
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) -> anyhow::Result<()> {
    Ok(())
}
