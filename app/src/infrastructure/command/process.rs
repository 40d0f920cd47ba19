use std::process::Stdio;
use std::sync::Arc;

use domain::{
    model::entity::Scheduler,
    service::{CommandExecutor, CommandLine, CommandOutput},
    JobsError, Result,
};
use service::prelude::ExecutorProvider;
use tokio::io::AsyncWriteExt;

use super::ssh_proxy::SSH_FAILURE;
use super::{MaybeSsh, SshConfig};

/// Runs scheduler tools as child processes, through ssh for remote locations.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    ssh: Option<SshConfig>,
}

impl ProcessExecutor {
    pub fn new(ssh: Option<SshConfig>) -> Self {
        Self { ssh }
    }
}

impl AsRef<Option<SshConfig>> for ProcessExecutor {
    fn as_ref(&self) -> &Option<SshConfig> {
        &self.ssh
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, line: &CommandLine) -> Result<CommandOutput> {
        let mut command = self.command(&line.program, &line.args, line.working_directory.as_deref());
        command
            .stdin(if line.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| JobsError::ExecutionFailed(format!("cannot start {}: {e}", line.program)))?;

        let pipe = child.stdin.take();
        let feed = async {
            if let (Some(input), Some(mut pipe)) = (&line.stdin, pipe) {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            std::io::Result::Ok(())
        };
        let (fed, out) = tokio::join!(feed, child.wait_with_output());
        let out = out?;
        fed?;

        let Some(exit_code) = out.status.code() else {
            return Err(JobsError::ExecutionFailed(format!("{line} terminated by a signal")));
        };
        if exit_code == SSH_FAILURE && self.is_ssh() {
            return Err(JobsError::ExecutionFailed(format!(
                "ssh failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(CommandOutput {
            exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }
}

/// Picks a [`ProcessExecutor`] from a scheduler's location.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutors;

impl ExecutorProvider for ProcessExecutors {
    fn executor(&self, scheduler: &Scheduler) -> Result<Arc<dyn CommandExecutor>> {
        let ssh = SshConfig::from_location(scheduler.location(), scheduler.credential())?;
        if let Some(ssh) = &ssh {
            tracing::debug!(scheduler = %scheduler, target = %ssh.username_host, "Using ssh proxy");
        }
        Ok(Arc::new(ProcessExecutor::new(ssh)))
    }
}
