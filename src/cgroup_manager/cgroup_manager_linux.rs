use std::{
    process::Child,
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use anyhow::{self, Context};
use cgroups_rs::Cgroup;
use thiserror::Error;

use super::{create_process, kill_process_group};

/// Maximum number of processes a peer may fork into its cgroup.
const MAX_PIDS: i64 = 100;

pub fn get_current_user_id() -> anyhow::Result<String> {
    let output = std::process::Command::new("id")
        .arg("-u")
        .output()
        .context("Could not launch 'id -u'")?;
    let untrimed_id = std::str::from_utf8(&output.stdout).context("id is not a valid string")?;
    Ok(untrimed_id.trim().to_string())
}

pub fn get_cgroup_path(user_id: &str, group_name: &str) -> String {
    format!("user.slice/user-{user_id}.slice/user@{user_id}.service/{group_name}")
}

/// Create a cgroup at `path`.
///
/// * `max_memory` - Maximum available memory in bytes. Non-positive means no restriction.
/// * `max_pids` - Maximum number of PIDs inside the cgroup at any time. Non-positive means no restriction.
/// * `cpus` - Comma separated cpu ranges ("1-5,7", "1,3,4", ...). Empty string means no restriction.
///
/// # Errors
///
/// Fails if the parameters are incorrect or if cgroup v2 is not available.
pub fn create_cgroup(
    path: &str,
    max_memory: i64,
    max_pids: i64,
    cpus: &str,
) -> anyhow::Result<Cgroup> {
    let mut builder = cgroups_rs::cgroup_builder::CgroupBuilder::new(path);
    if max_memory > 0 {
        builder = builder.memory().memory_hard_limit(max_memory).done();
    }
    if max_pids > 0 {
        builder = builder
            .pid()
            .maximum_number_of_processes(cgroups_rs::MaxValue::Value(max_pids))
            .done();
    }
    if !cpus.is_empty() {
        builder = builder.cpu().cpus(cpus.to_string()).done();
    }
    builder
        .build(cgroups_rs::hierarchies::auto())
        .context("could not create cgroup")
}

#[derive(Debug, Error)]
#[error("process {pid} still in its cgroup after {waited:?}")]
pub struct TimeoutError {
    pid: u64,
    waited: Duration,
}

pub fn wait_for_process_cleanup(
    cgroup: &Cgroup,
    pid: u64,
    max_duration: Duration,
) -> Result<(), TimeoutError> {
    let deadline = Instant::now() + max_duration;
    while cgroup.tasks().iter().any(|cpid| cpid.pid == pid) {
        if Instant::now() > deadline {
            return Err(TimeoutError {
                pid,
                waited: max_duration,
            });
        }
        std::thread::sleep(std::cmp::min(Duration::from_millis(10), max_duration / 10));
    }
    Ok(())
}

pub fn create_process_in_cgroup(
    command: &str,
    args: &[String],
    group: &Cgroup,
) -> anyhow::Result<Child> {
    let mut child = create_process(command, args)?;

    let pid = child.id() as u64;
    let addition = group.add_task_by_tgid(cgroups_rs::CgroupPid { pid });
    if addition.is_err() {
        let kill = child.kill();
        let _ = child.wait();
        addition.with_context(|| {
            if let Err(err) = kill {
                format!(
                    "could not add process to cgroup, and process could not be killed either ({err})"
                )
            } else {
                "could not add process to cgroup".to_string()
            }
        })?;
    }
    Ok(child)
}

/// A peer process, owned together with the cgroup it was placed in.
#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    cgroup: Option<Cgroup>,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(
        command: &str,
        args: &[String],
        max_memory: i64,
        cpus: &str,
    ) -> anyhow::Result<LimitedProcess> {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        let user_id = get_current_user_id().context("could not get user id")?;
        // one fresh cgroup per peer, unique within this referee process
        let group_name = format!(
            "OCEAN_REFEREE_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = get_cgroup_path(&user_id, &group_name);
        let group = create_cgroup(&path, max_memory, MAX_PIDS, cpus)
            .context("could not create cgroup")?;
        let child = create_process_in_cgroup(command, args, &group).with_context(|| {
            let _ = group.delete();
            "could not create process in cgroup"
        })?;

        Ok(LimitedProcess {
            child,
            cgroup: Some(group),
            cleaned_up: false,
        })
    }

    pub fn launch_without_container(
        command: &str,
        args: &[String],
    ) -> anyhow::Result<LimitedProcess> {
        let child = create_process(command, args).context("could not create process")?;

        Ok(LimitedProcess {
            child,
            cgroup: None,
            cleaned_up: false,
        })
    }

    pub fn is_contained(&self) -> bool {
        self.cgroup.is_some()
    }

    /// Kills the process (and everything else in its cgroup) and reaps it.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        match &self.cgroup {
            Some(cgroup) => {
                cgroup.kill().context("could not kill process")?;
                wait_for_process_cleanup(cgroup, self.child.id() as u64, max_duration)
                    .context("process cleanup timed out")?;
                let _ = self.child.wait();
                // the process is gone, a leftover cgroup only costs a directory
                self.cleaned_up = true;
                if let Err(e) = cgroup.delete() {
                    tracing::warn!("Failed to remove cgroup. If this happens a lot, it may slow down the computer. {e}");
                }
                Ok(())
            }
            None => {
                if let Err(e) = kill_process_group(&self.child) {
                    tracing::warn!("could not kill process group {}: {e:#}", self.child.id());
                }
                if let Err(e) = self.child.kill() {
                    if self.child.try_wait().ok().flatten().is_none() {
                        return Err(e).context("could not kill process");
                    }
                }
                let _ = self.child.wait();
                self.cleaned_up = true;
                Ok(())
            }
        }
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(Duration::from_millis(100)) {
                tracing::warn!(
                    "could not kill process {} on LimitedProcess::drop: {e:#}",
                    self.child.id()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgroup_path_is_under_the_user_slice() {
        assert_eq!(
            get_cgroup_path("1000", "g"),
            "user.slice/user-1000.slice/user@1000.service/g"
        );
    }

    #[test]
    fn uncontained_process_is_killed_and_reaped() {
        let mut process =
            LimitedProcess::launch_without_container("sleep", &["10".to_string()]).unwrap();
        assert!(!process.is_contained());
        process.try_kill(Duration::from_millis(100)).unwrap();
        assert!(process.child.try_wait().unwrap().is_some());
    }
}
