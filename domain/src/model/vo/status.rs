use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::error::JobsError;
use crate::model::entity::{Job, JobState, Scheduler};

/// Snapshot of a job as last reported by its backend.
///
/// `exception` is set only when retrieving this job's status failed, and then
/// every other field is empty. A job that left the live listing but is not yet
/// settled carries no state and is neither running nor done.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    job: Job,
    state: Option<JobState>,
    exit_code: Option<i32>,
    error: Option<JobsError>,
    finish_time: Option<NaiveDateTime>,
    exception: Option<JobsError>,
    info: HashMap<String, String>,
}

impl JobStatus {
    fn with_state(job: Job, state: Option<JobState>) -> Self {
        Self {
            job,
            state,
            exit_code: None,
            error: None,
            finish_time: None,
            exception: None,
            info: HashMap::new(),
        }
    }

    pub fn pending(job: Job) -> Self {
        Self::with_state(job, Some(JobState::Pending))
    }

    pub fn running(job: Job) -> Self {
        Self::with_state(job, Some(JobState::Running))
    }

    /// Gone from the live listing, outcome not known yet.
    pub fn unsettled(job: Job) -> Self {
        Self::with_state(job, None)
    }

    pub fn done(job: Job, exit_code: Option<i32>, error: Option<JobsError>) -> Self {
        Self {
            exit_code,
            error,
            ..Self::with_state(job, Some(JobState::Done))
        }
    }

    pub fn errored(job: Job, exit_code: Option<i32>, error: Option<JobsError>) -> Self {
        Self {
            exit_code,
            error,
            ..Self::with_state(job, Some(JobState::Error))
        }
    }

    pub fn failed_retrieval(job: Job, exception: JobsError) -> Self {
        Self {
            exception: Some(exception),
            ..Self::with_state(job, None)
        }
    }

    pub fn with_finish_time(mut self, finish_time: Option<NaiveDateTime>) -> Self {
        self.finish_time = finish_time;
        self
    }

    pub fn with_info(mut self, info: HashMap<String, String>) -> Self {
        self.info = info;
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn state(&self) -> Option<JobState> {
        self.state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn error(&self) -> Option<&JobsError> {
        self.error.as_ref()
    }

    pub fn finish_time(&self) -> Option<NaiveDateTime> {
        self.finish_time
    }

    pub fn exception(&self) -> Option<&JobsError> {
        self.exception.as_ref()
    }

    /// Scheduler specific fields, verbatim from the backend.
    pub fn info(&self) -> &HashMap<String, String> {
        &self.info
    }

    pub fn is_done(&self) -> bool {
        self.state.is_some_and(JobState::is_terminal)
    }

    pub fn is_running(&self) -> bool {
        self.state == Some(JobState::Running)
    }

    pub fn is_unsettled(&self) -> bool {
        self.state.is_none() && self.exception.is_none()
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }
}

/// Snapshot of one queue on a scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus {
    name: String,
    scheduler: Scheduler,
    properties: HashMap<String, String>,
    exception: Option<JobsError>,
}

impl QueueStatus {
    pub fn new(scheduler: Scheduler, name: &str, properties: HashMap<String, String>) -> Self {
        Self {
            name: name.to_owned(),
            scheduler,
            properties,
            exception: None,
        }
    }

    pub fn failed(scheduler: Scheduler, name: &str, exception: JobsError) -> Self {
        Self {
            name: name.to_owned(),
            scheduler,
            properties: HashMap::new(),
            exception: Some(exception),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn exception(&self) -> Option<&JobsError> {
        self.exception.as_ref()
    }
}
