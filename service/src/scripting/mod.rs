mod arena;
mod config;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::{
    model::{
        entity::{Job, JobState, Scheduler},
        vo::{JobDescription, JobStatus, QueueStatus},
    },
    service::{
        AccountingRecord, CommandExecutor, CommandLine, CommandOutput, ListingEntry, Queues,
        SchedulerConnection, SchedulerDialect,
    },
    JobsError, Result,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use self::arena::{JobArena, Phase};
pub use self::config::*;
use crate::adaptor::ConnectionFactory;

/// Picks the command channel for a scheduler's location and credential.
pub trait ExecutorProvider: Send + Sync {
    fn executor(&self, scheduler: &Scheduler) -> Result<Arc<dyn CommandExecutor>>;
}

/// Opens [`ScriptingConnection`]s speaking one dialect.
pub struct ScriptingFactory {
    dialect: Arc<dyn SchedulerDialect>,
    executors: Arc<dyn ExecutorProvider>,
}

impl ScriptingFactory {
    pub fn new(dialect: Arc<dyn SchedulerDialect>, executors: Arc<dyn ExecutorProvider>) -> Self {
        Self { dialect, executors }
    }
}

#[async_trait::async_trait]
impl ConnectionFactory for ScriptingFactory {
    async fn open(&self, scheduler: Scheduler) -> Result<Arc<dyn SchedulerConnection>> {
        let config = ScriptingConfig::from_properties(self.dialect.name(), scheduler.properties())?;
        let executor = self.executors.executor(&scheduler)?;
        let connection =
            ScriptingConnection::open(scheduler, executor, self.dialect.clone(), config).await?;
        Ok(Arc::new(connection))
    }
}

/// Serialises every command issued through one connection.
///
/// The lock guards a counter, so each command gets a sequence number in
/// the order the backend saw them.
struct CommandChannel {
    executor: Arc<dyn CommandExecutor>,
    sequence: Mutex<u64>,
}

impl CommandChannel {
    fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            sequence: Mutex::new(0),
        }
    }

    async fn run_sequenced(&self, command: &CommandLine) -> Result<(u64, CommandOutput)> {
        let mut sequence = self.sequence.lock().await;
        *sequence += 1;
        tracing::debug!(%command, seq = *sequence, "Executing");
        let out = self.executor.execute(command).await?;
        tracing::debug!(%command, exit_code = out.exit_code, "Executed");
        Ok((*sequence, out))
    }

    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        self.run_sequenced(command).await.map(|(_, out)| out)
    }
}

/// One live listing and its place in the connection's command order.
struct Listing {
    seq: u64,
    entries: HashMap<String, ListingEntry>,
}

/// A scheduler driven through its command line tools.
///
/// Status comes from two sources: the live listing, which forgets a job the
/// moment it leaves the queue, and the accounting record, which reports the
/// outcome after a backend controlled delay. A job missing from the listing
/// waits up to `accounting_grace_time` for its record before it is settled
/// without an exit code.
pub struct ScriptingConnection {
    scheduler: Scheduler,
    dialect: Arc<dyn SchedulerDialect>,
    channel: CommandChannel,
    config: ScriptingConfig,
    queues: Queues,
    jobs: JobArena,
    open: AtomicBool,
}

impl ScriptingConnection {
    /// Checks the backend version and loads its queue names.
    pub async fn open(
        scheduler: Scheduler,
        executor: Arc<dyn CommandExecutor>,
        dialect: Arc<dyn SchedulerDialect>,
        config: ScriptingConfig,
    ) -> Result<Self> {
        let channel = CommandChannel::new(executor);

        let out = channel.run(&dialect.version_command()).await?;
        let version = dialect.parse_version(&out)?;
        if !dialect.is_supported(&version) {
            if !config.ignore_version_check {
                return Err(JobsError::IncompatibleVersion {
                    found: version,
                    supported: dialect.supported_versions().iter().map(ToString::to_string).collect(),
                });
            }
            tracing::warn!(
                scheduler = %scheduler,
                %version,
                "Unsupported {} version, continuing as the version check is disabled",
                dialect.name()
            );
        }

        let command = dialect.queues_command();
        let out = channel.run(&command).await?;
        let queues = dialect.parse_queues(&expect_success(&command, &out)?)?;
        tracing::debug!(scheduler = %scheduler, queues = ?queues.names, "Connected");

        Ok(Self {
            scheduler,
            dialect,
            channel,
            config,
            queues,
            jobs: JobArena::default(),
            open: AtomicBool::new(true),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(JobsError::NotConnected(self.scheduler.to_string()))
        }
    }

    fn ensure_owned(&self, job: &Job) -> Result<()> {
        if job.scheduler() == &self.scheduler {
            Ok(())
        } else {
            Err(JobsError::NoSuchJob(format!(
                "{} does not belong to {}",
                job.id(),
                self.scheduler
            )))
        }
    }

    fn ensure_queue(&self, queue: &str) -> Result<()> {
        if self.queues.names.iter().any(|q| q == queue) {
            Ok(())
        } else {
            Err(JobsError::NoSuchQueue(queue.to_owned()))
        }
    }

    async fn live_listing(&self) -> Result<Listing> {
        let command = self.dialect.listing_command();
        let (seq, out) = self.channel.run_sequenced(&command).await?;
        let entries = self.dialect.parse_listing(&expect_success(&command, &out)?)?;
        Ok(Listing { seq, entries })
    }

    async fn accounting(&self, job_id: &str) -> Result<Option<AccountingRecord>> {
        let out = self.channel.run(&self.dialect.accounting_command(job_id)).await?;
        self.dialect.parse_accounting(job_id, &out)
    }

    fn settle_from_record(&self, job: &Job, record: AccountingRecord) -> JobStatus {
        let status = match record.state() {
            JobState::Error => JobStatus::errored(job.clone(), record.exit_code, record.error(job.id())),
            _ => JobStatus::done(job.clone(), record.exit_code, record.error(job.id())),
        }
        .with_finish_time(record.finish_time)
        .with_info(record.info);
        let settled = self.jobs.settle(job.id(), status);
        tracing::info!(job_id = %job.id(), state = ?settled.state(), exit_code = ?settled.exit_code(), "Job settled");
        settled
    }

    /// Folds one live listing snapshot into the job's record.
    async fn reconcile(&self, job: &Job, listing: &Listing) -> Result<JobStatus> {
        let id = job.id();
        let grace = self.config.accounting_grace_time;

        let record = match listing.entries.get(id) {
            Some(entry) => {
                let record = self.jobs.observe_active(id, entry.state, listing.seq);
                match record.phase {
                    Phase::Active(JobState::Error) => {
                        let reason = entry.failure.clone().unwrap_or_else(|| "error state".to_owned());
                        tracing::warn!(job_id = %id, %reason, "Backend holds the job in an error state");
                        let error = JobsError::JobFailed {
                            job_id: id.to_owned(),
                            reason,
                        };
                        let status = JobStatus::errored(job.clone(), None, Some(error))
                            .with_info(entry.info.clone());
                        return Ok(self.jobs.settle(id, status));
                    }
                    Phase::Active(state) => {
                        return Ok(active_status(job, state).with_info(entry.info.clone()))
                    }
                    _ => record,
                }
            }
            None => match self.jobs.observe_gone(id, listing.seq, Instant::now(), grace) {
                Some(record) => record,
                None => {
                    // Never seen by this connection: only accounting can vouch for it.
                    return match self.accounting(id).await? {
                        Some(record) => Ok(self.settle_from_record(job, record)),
                        None => Err(JobsError::NoSuchJob(id.to_owned())),
                    };
                }
            },
        };

        let (deadline, last_lookup) = match record.phase {
            Phase::Terminal(status) => return Ok(status),
            // A newer listing still shows the job.
            Phase::Active(state) => return Ok(active_status(job, state)),
            Phase::AwaitingAccounting {
                deadline,
                last_lookup,
            } => (deadline, last_lookup),
        };

        if record.cancel_requested {
            self.jobs.note_lookup(id, Instant::now());
            if let Some(record) = self.accounting(id).await? {
                return Ok(self.settle_from_record(job, record));
            }
            let status = JobStatus::done(job.clone(), None, Some(JobsError::Cancelled(id.to_owned())));
            tracing::info!(job_id = %id, "Cancelled job left the queue");
            return Ok(self.jobs.settle(id, status));
        }

        let now = Instant::now();
        let due = last_lookup
            .map_or(true, |at| now.duration_since(at) >= self.config.accounting_poll_delay);
        if due || now >= deadline {
            self.jobs.note_lookup(id, now);
            if let Some(record) = self.accounting(id).await? {
                return Ok(self.settle_from_record(job, record));
            }
        }

        if Instant::now() >= deadline {
            tracing::warn!(
                job_id = %id,
                grace_ms = grace.as_millis() as u64,
                "No accounting record within the grace period, settling without exit code"
            );
            let warning = JobsError::AccountingUnavailable {
                job_id: id.to_owned(),
                grace_ms: grace.as_millis() as u64,
            };
            return Ok(self.jobs.settle(id, JobStatus::done(job.clone(), None, Some(warning))));
        }

        Ok(JobStatus::unsettled(job.clone()))
    }

    fn known_status(&self, job: &Job, phase: &Phase) -> JobStatus {
        match phase {
            Phase::Active(state) => active_status(job, *state),
            Phase::AwaitingAccounting { .. } => JobStatus::unsettled(job.clone()),
            Phase::Terminal(status) => status.clone(),
        }
    }
}

#[async_trait::async_trait]
impl SchedulerConnection for ScriptingConnection {
    fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn poll_delay(&self) -> Duration {
        self.config.poll_delay
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn queue_names(&self) -> Vec<String> {
        self.queues.names.clone()
    }

    fn default_queue_name(&self) -> Option<String> {
        self.queues.default.clone()
    }

    async fn submit_job(&self, description: &JobDescription) -> Result<Job> {
        self.ensure_open()?;
        description.validate()?;
        if description.interactive {
            return Err(JobsError::invalid_description(format!(
                "{} does not support interactive jobs",
                self.dialect.name()
            )));
        }
        if let Some(queue) = &description.queue_name {
            self.ensure_queue(queue)?;
        }

        let command = self.dialect.submit_command(description)?;
        let (seq, out) = self.channel.run_sequenced(&command).await?;
        let stderr = out.stderr_str().trim().to_owned();
        if !out.success() {
            return Err(JobsError::SubmissionFailed {
                message: format!("{} exited with {}", command.program, out.exit_code),
                stderr,
            });
        }
        let id = self
            .dialect
            .parse_submit(&out.stdout_str())
            .map_err(|e| JobsError::SubmissionFailed {
                message: e.to_string(),
                stderr,
            })?;

        self.jobs.track(&id, seq);
        tracing::info!(job_id = %id, scheduler = %self.scheduler, "Job submitted");
        Ok(Job::new(self.scheduler.clone(), id))
    }

    async fn get_job_status(&self, job: &Job) -> Result<JobStatus> {
        self.ensure_open()?;
        self.ensure_owned(job)?;
        if let Some(settled) = self.jobs.terminal(job.id()) {
            return Ok(settled);
        }
        let listing = self.live_listing().await?;
        self.reconcile(job, &listing).await
    }

    async fn get_job_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>> {
        self.ensure_open()?;

        let mut statuses: Vec<Option<JobStatus>> = jobs
            .iter()
            .map(|job| match self.ensure_owned(job) {
                Ok(()) => self.jobs.terminal(job.id()),
                Err(e) => Some(JobStatus::failed_retrieval(job.clone(), e)),
            })
            .collect();

        if statuses.iter().any(Option::is_none) {
            let listing = self.live_listing().await?;
            for (job, slot) in jobs.iter().zip(statuses.iter_mut()) {
                if slot.is_none() {
                    *slot = Some(match self.reconcile(job, &listing).await {
                        Ok(status) => status,
                        Err(e) => JobStatus::failed_retrieval(job.clone(), e),
                    });
                }
            }
        }

        Ok(statuses.into_iter().flatten().collect())
    }

    async fn cancel_job(&self, job: &Job) -> Result<JobStatus> {
        self.ensure_open()?;
        self.ensure_owned(job)?;
        let id = job.id();
        if let Some(settled) = self.jobs.terminal(id) {
            return Ok(settled);
        }

        let (seq, out) = self.channel.run_sequenced(&self.dialect.cancel_command(id)).await?;
        if !out.success() {
            // Most likely the job left the queue already.
            tracing::debug!(job_id = %id, stderr = %out.stderr_str().trim(), "Cancel refused");
            return match self.jobs.get(id) {
                Some(_) => self.get_job_status(job).await,
                None => Err(JobsError::NoSuchJob(id.to_owned())),
            };
        }

        let record = self.jobs.request_cancel(id, seq);
        tracing::info!(job_id = %id, "Job cancellation requested");
        Ok(self.known_status(job, &record.phase))
    }

    async fn get_jobs(&self, queues: &[String]) -> Result<Vec<Job>> {
        self.ensure_open()?;
        for queue in queues {
            self.ensure_queue(queue)?;
        }
        let listing = self.live_listing().await?;

        let mut jobs = Vec::new();
        for (id, entry) in listing.entries {
            let wanted = queues.is_empty()
                || entry.queue.as_ref().is_some_and(|q| queues.contains(q));
            if wanted {
                // Error states settle on the next status query instead.
                if entry.state != JobState::Error {
                    self.jobs.observe_active(&id, entry.state, listing.seq);
                }
                jobs.push(Job::new(self.scheduler.clone(), id));
            }
        }
        jobs.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(jobs)
    }

    async fn get_queue_status(&self, queue: &str) -> Result<QueueStatus> {
        self.ensure_open()?;
        self.ensure_queue(queue)?;
        let command = self.dialect.queue_status_command(queue);
        let out = self.channel.run(&command).await?;
        let properties = self.dialect.parse_queue_status(&expect_success(&command, &out)?)?;
        Ok(QueueStatus::new(self.scheduler.clone(), queue, properties))
    }
}

fn active_status(job: &Job, state: JobState) -> JobStatus {
    match state {
        JobState::Pending => JobStatus::pending(job.clone()),
        _ => JobStatus::running(job.clone()),
    }
}

/// Stdout of a command that has to succeed.
fn expect_success(command: &CommandLine, out: &CommandOutput) -> Result<String> {
    if out.success() {
        Ok(out.stdout_str().into_owned())
    } else {
        Err(JobsError::unknown(format!(
            "{} exited with {}: {}",
            command,
            out.exit_code,
            out.stderr_str().trim()
        )))
    }
}
