use thiserror::Error;

pub type Result<T, E = JobsError> = std::result::Result<T, E>;

/// Every failure the engine and its adaptors can report.
///
/// Cloneable so a failure can live inside a cached [`JobStatus`](crate::model::vo::JobStatus).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobsError {
    #[error("invalid job description: {0}")]
    InvalidJobDescription(String),

    #[error("job submission failed: {message}")]
    SubmissionFailed { message: String, stderr: String },

    #[error("no such job: {0}")]
    NoSuchJob(String),

    #[error("no such scheduler: {0}")]
    NoSuchScheduler(String),

    #[error("no such queue: {0}")]
    NoSuchQueue(String),

    #[error("incompatible version {found:?}, supported: {}", .supported.join(", "))]
    IncompatibleVersion {
        found: String,
        supported: Vec<String>,
    },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("scheduler not connected: {0}")]
    NotConnected(String),

    #[error("timed out after {waited_ms}ms waiting for job {job_id}")]
    Timeout { job_id: String, waited_ms: u64 },

    #[error("job {0} was cancelled")]
    Cancelled(String),

    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("invalid property {name}: {reason}")]
    InvalidProperty { name: String, reason: String },

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("no accounting record for job {job_id} within {grace_ms}ms, exit code unknown")]
    AccountingUnavailable { job_id: String, grace_ms: u64 },

    #[error("{0}")]
    Unknown(String),
}

impl JobsError {
    pub fn invalid_description(reason: impl Into<String>) -> Self {
        Self::InvalidJobDescription(reason.into())
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::Unknown(reason.into())
    }

    /// Whether the failure is a warning attached to an otherwise settled job.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::AccountingUnavailable { .. })
    }
}

impl From<std::io::Error> for JobsError {
    fn from(e: std::io::Error) -> Self {
        Self::ExecutionFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_error_lists_supported() {
        let e = JobsError::IncompatibleVersion {
            found: "GE 5.3".to_owned(),
            supported: vec!["GE 6.2".to_owned(), "SGE 8.1".to_owned()],
        };
        assert_eq!(
            e.to_string(),
            r#"incompatible version "GE 5.3", supported: GE 6.2, SGE 8.1"#
        );
    }

    #[test]
    fn only_grace_exhaustion_is_a_warning() {
        let warning = JobsError::AccountingUnavailable {
            job_id: "1".to_owned(),
            grace_ms: 10,
        };
        assert!(warning.is_warning());
        assert!(!JobsError::Cancelled("1".to_owned()).is_warning());
    }
}
