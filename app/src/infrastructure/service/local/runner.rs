use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use domain::{
    model::{entity::Job, vo::{JobDescription, JobStatus}},
    JobsError, Result,
};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Shared state of one local job.
#[derive(Debug)]
pub(super) struct LocalJob {
    pub queue: String,
    pub cancel: CancellationToken,
    status: Mutex<JobStatus>,
}

impl LocalJob {
    pub fn new(job: Job, queue: String) -> Self {
        Self {
            queue,
            cancel: CancellationToken::new(),
            status: Mutex::new(JobStatus::pending(job)),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Updates the status unless the job already finished.
    fn set(&self, status: JobStatus) {
        let mut current = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if !current.is_done() {
            *current = status;
        }
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    OutOfTime,
}

fn resolve(dir: Option<&str>, path: &str) -> PathBuf {
    Path::new(dir.unwrap_or(".")).join(path)
}

fn spawn(description: &JobDescription) -> Result<Child> {
    let dir = description.working_directory.as_deref();
    let open = |path: &str, create: bool| {
        let path = resolve(dir, path);
        let file = if create { File::create(&path) } else { File::open(&path) };
        file.map_err(|e| JobsError::ExecutionFailed(format!("{}: {e}", path.display())))
    };

    let stdin = match &description.stdin {
        Some(path) => Stdio::from(open(path, false)?),
        None => Stdio::null(),
    };
    let stdout = open(&description.stdout, true)?;
    let stderr = if description.stderr == description.stdout {
        stdout.try_clone()?
    } else {
        open(&description.stderr, true)?
    };

    let mut command = Command::new(&description.executable);
    command
        .args(&description.arguments)
        .envs(&description.environment)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    command
        .spawn()
        .map_err(|e| JobsError::ExecutionFailed(format!("cannot start {}: {e}", description.executable)))
}

/// Drives one job from its queue slot to a final status.
pub(super) async fn run(
    job: Job,
    description: JobDescription,
    record: Arc<LocalJob>,
    slots: Option<Arc<Semaphore>>,
) {
    let cancelled = || JobStatus::done(job.clone(), None, Some(JobsError::Cancelled(job.id().to_owned())));

    let _permit = match slots {
        Some(slots) => tokio::select! {
            permit = slots.acquire_owned() => permit.ok(),
            _ = record.cancel.cancelled() => {
                record.set(cancelled());
                return;
            }
        },
        None => None,
    };

    let mut child = match spawn(&description) {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(job_id = %job.id(), "Local job failed to start: {e}");
            record.set(JobStatus::errored(job.clone(), None, Some(e)));
            return;
        }
    };
    record.set(JobStatus::running(job.clone()));
    tracing::info!(job_id = %job.id(), pid = ?child.id(), "Local job started");

    let limit = (description.max_time > 0).then(|| Duration::from_secs(60 * u64::from(description.max_time)));
    let out_of_time = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Exited(status),
        _ = record.cancel.cancelled() => Outcome::Cancelled,
        _ = out_of_time => Outcome::OutOfTime,
    };

    let status = match outcome {
        Outcome::Exited(Ok(status)) => match status.code() {
            Some(0) => JobStatus::done(job.clone(), Some(0), None),
            Some(code) => JobStatus::errored(job.clone(), Some(code), None),
            None => JobStatus::errored(
                job.clone(),
                None,
                Some(JobsError::JobFailed {
                    job_id: job.id().to_owned(),
                    reason: "terminated by a signal".to_owned(),
                }),
            ),
        },
        Outcome::Exited(Err(e)) => JobStatus::errored(job.clone(), None, Some(e.into())),
        Outcome::Cancelled => {
            if let Err(e) = child.kill().await {
                tracing::warn!(job_id = %job.id(), "Cannot kill local job: {e}");
            }
            cancelled()
        }
        Outcome::OutOfTime => {
            if let Err(e) = child.kill().await {
                tracing::warn!(job_id = %job.id(), "Cannot kill local job: {e}");
            }
            JobStatus::errored(
                job.clone(),
                None,
                Some(JobsError::JobFailed {
                    job_id: job.id().to_owned(),
                    reason: format!("exceeded its wall time of {} minutes", description.max_time),
                }),
            )
        }
    };
    tracing::info!(job_id = %job.id(), state = ?status.state(), exit_code = ?status.exit_code(), "Local job finished");
    record.set(status);
}
