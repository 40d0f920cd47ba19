use std::sync::Arc;
use std::time::Duration;

use dashmap::{mapref::entry::Entry, DashMap};
use domain::model::{entity::JobState, vo::JobStatus};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) enum Phase {
    /// Last seen in the live listing.
    Active(JobState),
    /// Left the live listing, outcome not recorded yet.
    AwaitingAccounting {
        deadline: Instant,
        last_lookup: Option<Instant>,
    },
    /// Settled; never changes again.
    Terminal(JobStatus),
}

#[derive(Debug, Clone)]
pub(crate) struct JobRecord {
    pub phase: Phase,
    pub cancel_requested: bool,
    /// Sequence number of the newest command output folded into this record.
    seen: u64,
}

/// Per-job bookkeeping of one connection, keyed by backend job id.
///
/// Every transition happens under the map's entry lock, so concurrent
/// queries see either the old or the new record. Observations carry the
/// sequence number of the listing they came from; one older than what the
/// record already reflects is ignored.
#[derive(Debug, Default)]
pub(crate) struct JobArena {
    records: DashMap<Arc<str>, JobRecord>,
}

impl JobRecord {
    fn new(phase: Phase, seen: u64) -> Self {
        Self {
            phase,
            cancel_requested: false,
            seen,
        }
    }

    /// Claims `seq` for this record unless a newer observation got there first.
    fn advance(&mut self, seq: u64) -> bool {
        if seq < self.seen {
            return false;
        }
        self.seen = seq;
        true
    }
}

impl JobArena {
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn terminal(&self, id: &str) -> Option<JobStatus> {
        match self.records.get(id)?.phase {
            Phase::Terminal(ref status) => Some(status.clone()),
            _ => None,
        }
    }

    /// A job was just submitted through this connection.
    pub fn track(&self, id: &str, seq: u64) {
        self.records
            .entry(Arc::from(id))
            .or_insert_with(|| JobRecord::new(Phase::Active(JobState::Pending), seq));
    }

    /// Seen in the live listing `seq`. Only an active job takes the new
    /// state; a job that left an earlier listing never becomes active again.
    pub fn observe_active(&self, id: &str, state: JobState, seq: u64) -> JobRecord {
        let mut record = self
            .records
            .entry(Arc::from(id))
            .or_insert_with(|| JobRecord::new(Phase::Active(state), seq));
        if record.advance(seq) {
            if let Phase::Active(_) = record.phase {
                record.phase = Phase::Active(state);
            }
        }
        record.clone()
    }

    /// Absent from the live listing `seq`. Starts the grace period for jobs
    /// that were active; `None` for jobs this connection never saw.
    pub fn observe_gone(
        &self,
        id: &str,
        seq: u64,
        now: Instant,
        grace: Duration,
    ) -> Option<JobRecord> {
        let mut record = self.records.get_mut(id)?;
        if record.advance(seq) {
            if let Phase::Active(_) = record.phase {
                tracing::debug!(job_id = %id, "Job left the live listing, awaiting accounting");
                record.phase = Phase::AwaitingAccounting {
                    deadline: now + grace,
                    last_lookup: None,
                };
            }
        }
        Some(record.clone())
    }

    pub fn note_lookup(&self, id: &str, now: Instant) {
        if let Some(mut record) = self.records.get_mut(id) {
            if let Phase::AwaitingAccounting { last_lookup, .. } = &mut record.phase {
                *last_lookup = Some(now);
            }
        }
    }

    /// Marks a cancellation accepted by the backend. Only an active job is
    /// flagged; one that already left the listing keeps waiting for its
    /// record. Unknown jobs are tracked from here on.
    pub fn request_cancel(&self, id: &str, seq: u64) -> JobRecord {
        let mut record = self
            .records
            .entry(Arc::from(id))
            .or_insert_with(|| JobRecord::new(Phase::Active(JobState::Pending), seq));
        if let Phase::Active(_) = record.phase {
            record.cancel_requested = true;
        }
        record.clone()
    }

    /// Stores `status` unless the job already settled. Returns whichever
    /// status ends up stored.
    pub fn settle(&self, id: &str, status: JobStatus) -> JobStatus {
        match self.records.entry(Arc::from(id)) {
            Entry::Occupied(mut entry) => {
                if let Phase::Terminal(ref settled) = entry.get().phase {
                    return settled.clone();
                }
                entry.get_mut().phase = Phase::Terminal(status.clone());
                status
            }
            Entry::Vacant(entry) => {
                entry.insert(JobRecord::new(Phase::Terminal(status.clone()), 0));
                status
            }
        }
    }
}
