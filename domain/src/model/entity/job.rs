use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strum::Display;

use super::Scheduler;

/// A job accepted by a backend. Never moves to another scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    id: Arc<str>,
    scheduler: Scheduler,
}

/// Public job states, ordered by progress.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Error,
}

impl Job {
    pub fn new(scheduler: Scheduler, id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            scheduler,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.scheduler)
    }
}

impl JobState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_by_progress() {
        assert!(JobState::Pending < JobState::Running);
        assert!(JobState::Running < JobState::Done);
        assert!(JobState::Error.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert_eq!(JobState::Running.to_string(), "RUNNING");
    }
}
