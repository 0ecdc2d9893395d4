use std::{process::Child, time::Duration};

use anyhow::{self, bail, Context};

use super::{create_process, kill_process_group};

#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(
        _command: &str,
        _args: &[String],
        _max_memory: i64,
        _cpus: &str,
    ) -> anyhow::Result<LimitedProcess> {
        bail!("cgroups only available on linux")
    }

    pub fn launch_without_container(
        command: &str,
        args: &[String],
    ) -> anyhow::Result<LimitedProcess> {
        let child = create_process(command, args).context("could not create process")?;
        Ok(LimitedProcess {
            child,
            cleaned_up: false,
        })
    }

    pub fn is_contained(&self) -> bool {
        false
    }

    pub fn try_kill(&mut self, _max_duration: Duration) -> anyhow::Result<()> {
        if let Err(e) = kill_process_group(&self.child) {
            tracing::warn!("could not kill process group {}: {e:#}", self.child.id());
        }
        if let Err(e) = self.child.kill() {
            // already exited
            if self.child.try_wait().ok().flatten().is_none() {
                return Err(e).context("could not kill process");
            }
        }
        let _ = self.child.wait();
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(Duration::from_millis(10)) {
                tracing::warn!("could not kill process on LimitedProcess::drop: {e:#}");
            }
        }
    }
}
