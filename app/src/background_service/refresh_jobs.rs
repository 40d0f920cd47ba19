use std::ops::ControlFlow;
use std::time::Duration;

use domain::{
    model::{entity::Job, vo::JobStatus},
    JobsError,
};
use infrastructure::sync::timer;
use service::prelude::JobsEngine;

/// Reports the status of `jobs` every `interval` until all of them are done.
pub async fn refresh_jobs(engine: JobsEngine, jobs: Vec<Job>, interval: Duration) {
    let jobs: Vec<Option<Job>> = jobs.into_iter().map(Some).collect();
    let (engine, jobs) = (&engine, &jobs);
    timer::new(interval, move || async move {
        let statuses = engine.get_job_statuses(&jobs).await;
        let mut finished = 0;
        for status in statuses.iter().flatten() {
            report(status);
            if status.is_done() {
                finished += 1;
            }
        }
        if finished == jobs.len() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .await;
}

fn report(status: &JobStatus) {
    let job = status.job();
    if let Some(e) = status.exception() {
        tracing::error!(job_id = %job.id(), scheduler = %job.scheduler(), "Failed to refresh job: {e}");
        return;
    }
    let state = status.state().map_or("UNSETTLED".to_owned(), |s| s.to_string());
    match status.error() {
        Some(e) if e.is_warning() || matches!(e, JobsError::Cancelled(_)) => {
            tracing::warn!(job_id = %job.id(), %state, exit_code = ?status.exit_code(), "{e}")
        }
        Some(e) => tracing::error!(job_id = %job.id(), %state, exit_code = ?status.exit_code(), "{e}"),
        None => tracing::info!(job_id = %job.id(), %state, exit_code = ?status.exit_code(), "Job status"),
    }
}
