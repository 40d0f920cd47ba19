use std::time::Duration;

use crate::error::Result;
use crate::model::{
    entity::{Job, Scheduler},
    vo::{JobDescription, JobStatus, QueueStatus},
};

/// An open handle to one backend.
#[async_trait::async_trait]
pub trait SchedulerConnection: Send + Sync {
    fn scheduler(&self) -> &Scheduler;

    /// Interval between status polls in wait loops.
    fn poll_delay(&self) -> Duration;

    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<()>;

    fn queue_names(&self) -> Vec<String>;

    fn default_queue_name(&self) -> Option<String>;

    async fn submit_job(&self, description: &JobDescription) -> Result<Job>;

    async fn get_job_status(&self, job: &Job) -> Result<JobStatus>;

    /// Statuses in input order. A failure for one job lands in that job's
    /// status; `Err` means the whole round trip failed.
    async fn get_job_statuses(&self, jobs: &[Job]) -> Result<Vec<JobStatus>> {
        let mut statuses = Vec::with_capacity(jobs.len());
        for job in jobs {
            statuses.push(match self.get_job_status(job).await {
                Ok(status) => status,
                Err(e) => JobStatus::failed_retrieval(job.clone(), e),
            });
        }
        Ok(statuses)
    }

    /// Requests cancellation and returns the status known right now.
    async fn cancel_job(&self, job: &Job) -> Result<JobStatus>;

    /// Jobs currently queued or running, optionally limited to `queues`.
    async fn get_jobs(&self, queues: &[String]) -> Result<Vec<Job>>;

    async fn get_queue_status(&self, queue: &str) -> Result<QueueStatus>;

    async fn get_queue_statuses(&self, queues: &[String]) -> Vec<QueueStatus> {
        let mut statuses = Vec::with_capacity(queues.len());
        for queue in queues {
            statuses.push(match self.get_queue_status(queue).await {
                Ok(status) => status,
                Err(e) => QueueStatus::failed(self.scheduler().clone(), queue, e),
            });
        }
        statuses
    }
}
