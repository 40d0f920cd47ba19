use std::collections::HashMap;

use chrono::NaiveDateTime;

use super::{CommandLine, CommandOutput};
use crate::error::{JobsError, Result};
use crate::model::{entity::JobState, vo::JobDescription};

/// A job as shown by the live listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// `Pending`, `Running`, or `Error` for a job the backend holds in an
    /// error state.
    pub state: JobState,
    pub queue: Option<String>,
    /// Why the backend holds the job, set with `JobState::Error`.
    pub failure: Option<String>,
    pub info: HashMap<String, String>,
}

/// Outcome of a finished job from the backend's accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountingRecord {
    pub exit_code: Option<i32>,
    /// Set when the backend reports an abnormal end.
    pub failure: Option<String>,
    pub cancelled: bool,
    pub finish_time: Option<NaiveDateTime>,
    pub info: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Queues {
    pub names: Vec<String>,
    pub default: Option<String>,
}

/// Command syntax and output grammar of one scheduler product.
///
/// Parsers return a complete structure or an error, never a partial result.
pub trait SchedulerDialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Version prefixes this dialect has been written against.
    fn supported_versions(&self) -> &[&'static str];

    fn is_supported(&self, version: &str) -> bool {
        self.supported_versions().iter().any(|v| version.starts_with(v))
    }

    fn version_command(&self) -> CommandLine;

    fn parse_version(&self, output: &CommandOutput) -> Result<String>;

    /// Backend specific validation and rendering of a submission.
    fn submit_command(&self, description: &JobDescription) -> Result<CommandLine>;

    fn parse_submit(&self, stdout: &str) -> Result<String>;

    fn listing_command(&self) -> CommandLine;

    fn parse_listing(&self, stdout: &str) -> Result<HashMap<String, ListingEntry>>;

    fn accounting_command(&self, job_id: &str) -> CommandLine;

    /// `Ok(None)` when the backend has no record (yet).
    fn parse_accounting(&self, job_id: &str, output: &CommandOutput)
        -> Result<Option<AccountingRecord>>;

    fn cancel_command(&self, job_id: &str) -> CommandLine;

    fn queues_command(&self) -> CommandLine;

    fn parse_queues(&self, stdout: &str) -> Result<Queues>;

    fn queue_status_command(&self, queue: &str) -> CommandLine;

    fn parse_queue_status(&self, stdout: &str) -> Result<HashMap<String, String>>;
}

impl AccountingRecord {
    pub fn state(&self) -> JobState {
        if self.failure.is_some() || self.exit_code.is_some_and(|code| code != 0) {
            JobState::Error
        } else {
            JobState::Done
        }
    }

    /// Job level error to attach to the settled status.
    pub fn error(&self, job_id: &str) -> Option<JobsError> {
        if self.cancelled {
            return Some(JobsError::Cancelled(job_id.to_owned()));
        }
        self.failure.as_ref().map(|reason| JobsError::JobFailed {
            job_id: job_id.to_owned(),
            reason: reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_state() {
        let ok = AccountingRecord {
            exit_code: Some(0),
            ..Default::default()
        };
        assert_eq!(ok.state(), JobState::Done);
        assert_eq!(ok.error("1"), None);

        let nonzero = AccountingRecord {
            exit_code: Some(2),
            ..Default::default()
        };
        assert_eq!(nonzero.state(), JobState::Error);

        let failed = AccountingRecord {
            exit_code: Some(0),
            failure: Some("killed".to_owned()),
            ..Default::default()
        };
        assert_eq!(failed.state(), JobState::Error);
        assert!(matches!(failed.error("1"), Some(JobsError::JobFailed { .. })));
    }
}
