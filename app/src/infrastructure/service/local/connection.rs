use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use domain::{
    model::{
        entity::{Job, Scheduler},
        vo::{JobDescription, JobStatus, QueueStatus},
    },
    service::SchedulerConnection,
    JobsError, Result,
};
use tokio::sync::Semaphore;

use super::runner::{self, LocalJob};
use super::{LocalConfig, QUEUES};

/// Jobs running as children of this process.
pub struct LocalConnection {
    scheduler: Scheduler,
    config: LocalConfig,
    next_id: AtomicU64,
    jobs: DashMap<Arc<str>, Arc<LocalJob>>,
    single: Arc<Semaphore>,
    multi: Arc<Semaphore>,
    open: AtomicBool,
}

impl LocalConnection {
    pub fn new(scheduler: Scheduler, config: LocalConfig) -> Self {
        Self {
            scheduler,
            multi: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            single: Arc::new(Semaphore::new(1)),
            config,
            next_id: AtomicU64::new(1),
            jobs: DashMap::new(),
            open: AtomicBool::new(true),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(JobsError::NotConnected(self.scheduler.to_string()))
        }
    }

    fn ensure_queue(queue: &str) -> Result<()> {
        if QUEUES.contains(&queue) {
            Ok(())
        } else {
            Err(JobsError::NoSuchQueue(queue.to_owned()))
        }
    }

    fn slots(&self, queue: &str) -> Option<Arc<Semaphore>> {
        match queue {
            "single" => Some(self.single.clone()),
            "multi" => Some(self.multi.clone()),
            _ => None,
        }
    }

    fn record(&self, job: &Job) -> Result<Arc<LocalJob>> {
        if job.scheduler() != &self.scheduler {
            return Err(JobsError::NoSuchJob(format!("{} does not belong to {}", job.id(), self.scheduler)));
        }
        self.jobs
            .get(job.id())
            .map(|r| r.value().clone())
            .ok_or_else(|| JobsError::NoSuchJob(job.id().to_owned()))
    }
}

#[async_trait::async_trait]
impl SchedulerConnection for LocalConnection {
    fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn poll_delay(&self) -> Duration {
        self.config.poll_delay
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Cancels every job still queued or running.
    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        for record in self.jobs.iter() {
            record.cancel.cancel();
        }
        Ok(())
    }

    fn queue_names(&self) -> Vec<String> {
        QUEUES.iter().map(ToString::to_string).collect()
    }

    fn default_queue_name(&self) -> Option<String> {
        Some(QUEUES[0].to_owned())
    }

    async fn submit_job(&self, description: &JobDescription) -> Result<Job> {
        self.ensure_open()?;
        description.validate()?;
        if description.interactive {
            return Err(JobsError::invalid_description("the local adaptor does not support interactive jobs"));
        }
        if let Some(key) = description.job_options.keys().next() {
            return Err(JobsError::invalid_description(format!("unknown job option {key:?}")));
        }
        if description.slots() > 1 {
            return Err(JobsError::invalid_description("the local adaptor runs single process jobs"));
        }
        let queue = description.queue_name.as_deref().unwrap_or(QUEUES[0]);
        Self::ensure_queue(queue)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let job = Job::new(self.scheduler.clone(), id.as_str());
        let record = Arc::new(LocalJob::new(job.clone(), queue.to_owned()));
        self.jobs.insert(Arc::from(id.as_str()), record.clone());

        tokio::spawn(runner::run(job.clone(), description.clone(), record, self.slots(queue)));
        tracing::info!(job_id = %id, %queue, "Local job submitted");
        Ok(job)
    }

    async fn get_job_status(&self, job: &Job) -> Result<JobStatus> {
        self.ensure_open()?;
        Ok(self.record(job)?.status())
    }

    async fn cancel_job(&self, job: &Job) -> Result<JobStatus> {
        self.ensure_open()?;
        let record = self.record(job)?;
        let status = record.status();
        if !status.is_done() {
            record.cancel.cancel();
            tracing::info!(job_id = %job.id(), "Local job cancellation requested");
        }
        Ok(status)
    }

    async fn get_jobs(&self, queues: &[String]) -> Result<Vec<Job>> {
        self.ensure_open()?;
        for queue in queues {
            Self::ensure_queue(queue)?;
        }
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|r| queues.is_empty() || queues.contains(&r.queue))
            .map(|r| r.status())
            .filter(|s| !s.is_done())
            .map(|s| s.job().clone())
            .collect();
        jobs.sort_by_key(|job| job.id().parse::<u64>().unwrap_or(u64::MAX));
        Ok(jobs)
    }

    async fn get_queue_status(&self, queue: &str) -> Result<QueueStatus> {
        self.ensure_open()?;
        Self::ensure_queue(queue)?;
        let active = self
            .jobs
            .iter()
            .filter(|r| r.queue == queue && !r.status().is_done())
            .count();
        let limit = match queue {
            "single" => "1".to_owned(),
            "multi" => self.config.max_concurrent_jobs.to_string(),
            _ => "unlimited".to_owned(),
        };
        let properties = [
            ("maxConcurrentJobs".to_owned(), limit),
            ("activeJobs".to_owned(), active.to_string()),
        ]
        .into();
        Ok(QueueStatus::new(self.scheduler.clone(), queue, properties))
    }
}
