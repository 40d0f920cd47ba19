use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    model::{
        entity::{Credential, Job, Scheduler},
        vo::{JobDescription, JobStatus, QueueStatus},
    },
    service::{Adaptor, SchedulerConnection},
    JobsError, Result,
};
use futures::future::join_all;
use infrastructure::sync::timer;

use crate::registry::AdaptorRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptorInfo {
    pub name: String,
    pub description: String,
    pub schemes: Vec<String>,
}

/// Single entry point for submitting, tracking and cancelling jobs on any
/// registered backend.
///
/// Holds no lock of its own: calls for different schedulers never wait on
/// each other here.
#[derive(Clone)]
pub struct JobsEngine {
    registry: Arc<AdaptorRegistry>,
}

impl JobsEngine {
    pub fn new(registry: Arc<AdaptorRegistry>) -> Self {
        Self { registry }
    }

    /// Engine over the registry installed at startup.
    pub fn global() -> Result<Self> {
        AdaptorRegistry::global().map(Self::new)
    }

    fn adaptor(&self, scheduler: &Scheduler) -> Result<&Arc<dyn Adaptor>> {
        self.registry.by_name(scheduler.adaptor_name())
    }

    fn connection(&self, scheduler: &Scheduler) -> Result<Arc<dyn SchedulerConnection>> {
        self.adaptor(scheduler)?.connection(scheduler)
    }

    pub fn adaptors(&self) -> Vec<AdaptorInfo> {
        self.registry
            .iter()
            .map(|a| AdaptorInfo {
                name: a.name().to_owned(),
                description: a.description().to_owned(),
                schemes: a.schemes().iter().map(ToString::to_string).collect(),
            })
            .collect()
    }

    pub async fn new_scheduler(
        &self,
        scheme: &str,
        location: &str,
        credential: Option<Credential>,
        properties: HashMap<String, String>,
    ) -> Result<Scheduler> {
        self.registry
            .resolve(scheme)?
            .new_scheduler(scheme, location, credential, properties)
            .await
    }

    pub async fn close(&self, scheduler: &Scheduler) -> Result<()> {
        self.adaptor(scheduler)?.close(scheduler).await
    }

    pub fn is_open(&self, scheduler: &Scheduler) -> bool {
        self.connection(scheduler).is_ok_and(|c| c.is_open())
    }

    pub fn default_queue_name(&self, scheduler: &Scheduler) -> Result<Option<String>> {
        Ok(self.connection(scheduler)?.default_queue_name())
    }

    pub fn queue_names(&self, scheduler: &Scheduler) -> Result<Vec<String>> {
        Ok(self.connection(scheduler)?.queue_names())
    }

    pub async fn submit_job(&self, scheduler: &Scheduler, description: &JobDescription) -> Result<Job> {
        self.connection(scheduler)?.submit_job(description).await
    }

    pub async fn get_job_status(&self, job: &Job) -> Result<JobStatus> {
        self.connection(job.scheduler())?.get_job_status(job).await
    }

    /// One status per input position, `None` for `None`.
    ///
    /// Jobs are queried once per adaptor. A failing adaptor only marks its
    /// own jobs with the failure.
    pub async fn get_job_statuses(&self, jobs: &[Option<Job>]) -> Vec<Option<JobStatus>> {
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (i, job) in jobs.iter().enumerate() {
            let Some(job) = job else { continue };
            let name = job.scheduler().adaptor_name();
            match groups.iter_mut().find(|(n, _)| *n == name) {
                Some((_, positions)) => positions.push(i),
                None => groups.push((name, vec![i])),
            }
        }

        let queries = groups.into_iter().map(|(name, positions)| async move {
            let batch: Vec<Option<Job>> = positions.iter().map(|&i| jobs[i].clone()).collect();
            let outcome = match self.registry.by_name(name) {
                Ok(adaptor) => adaptor.get_job_statuses(&batch).await,
                Err(e) => Err(e),
            };
            (positions, batch, outcome)
        });

        let mut statuses = vec![None; jobs.len()];
        for (positions, batch, outcome) in join_all(queries).await {
            let outcome = outcome.and_then(|found| {
                if found.len() == batch.len() {
                    Ok(found)
                } else {
                    Err(JobsError::unknown("adaptor returned a short status batch"))
                }
            });
            match outcome {
                Ok(found) => {
                    for ((i, job), status) in positions.into_iter().zip(batch).zip(found) {
                        statuses[i] = status.or_else(|| {
                            job.map(|job| {
                                JobStatus::failed_retrieval(
                                    job,
                                    JobsError::unknown("adaptor returned no status"),
                                )
                            })
                        });
                    }
                }
                Err(e) => {
                    for (i, job) in positions.into_iter().zip(batch) {
                        statuses[i] = job.map(|job| JobStatus::failed_retrieval(job, e.clone()));
                    }
                }
            }
        }
        statuses
    }

    /// Polls until the job runs or has run. `timeout_ms == 0` waits forever.
    pub async fn wait_until_running(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        self.wait_until(job, timeout_ms, |s| {
            s.is_running() || s.is_done() || s.is_unsettled()
        })
        .await
    }

    /// Polls until the job settles. `timeout_ms == 0` waits forever.
    pub async fn wait_until_done(&self, job: &Job, timeout_ms: i64) -> Result<JobStatus> {
        self.wait_until(job, timeout_ms, JobStatus::is_done).await
    }

    async fn wait_until(
        &self,
        job: &Job,
        timeout_ms: i64,
        reached: fn(&JobStatus) -> bool,
    ) -> Result<JobStatus> {
        let timeout = u64::try_from(timeout_ms)
            .map_err(|_| JobsError::InvalidArgument(format!("negative timeout {timeout_ms}")))?;
        let connection = self.connection(job.scheduler())?;
        let connection = &connection;

        let poll = move || async move {
            match connection.get_job_status(job).await {
                Ok(status) if reached(&status) => ControlFlow::Break(Ok(status)),
                Ok(_) => ControlFlow::Continue(()),
                Err(e) => ControlFlow::Break(Err(e)),
            }
        };

        let interval = connection.poll_delay();
        if timeout == 0 {
            return timer::new(interval, poll).await;
        }
        timer::within(Duration::from_millis(timeout), interval, poll)
            .await
            .unwrap_or_else(|| {
                Err(JobsError::Timeout {
                    job_id: job.id().to_owned(),
                    waited_ms: timeout,
                })
            })
    }

    /// Requests cancellation; returns at once with the known status.
    pub async fn cancel_job(&self, job: &Job) -> Result<JobStatus> {
        self.connection(job.scheduler())?.cancel_job(job).await
    }

    pub async fn get_jobs(&self, scheduler: &Scheduler, queues: &[String]) -> Result<Vec<Job>> {
        self.connection(scheduler)?.get_jobs(queues).await
    }

    pub async fn get_queue_status(&self, scheduler: &Scheduler, queue: &str) -> Result<QueueStatus> {
        self.connection(scheduler)?.get_queue_status(queue).await
    }

    /// One status per queue; failures stay inside the affected queue's status.
    pub async fn get_queue_statuses(
        &self,
        scheduler: &Scheduler,
        queues: &[String],
    ) -> Result<Vec<QueueStatus>> {
        let connection = self.connection(scheduler)?;
        let queues = if queues.is_empty() {
            connection.queue_names()
        } else {
            queues.to_vec()
        };
        Ok(connection.get_queue_statuses(&queues).await)
    }
}

#[cfg(test)]
mod tests {
    use domain::model::entity::JobState;

    use super::*;
    use crate::testing::{fake_adaptor_with, FakeBackend};

    fn description() -> JobDescription {
        JobDescription::builder().executable("/bin/true").build()
    }

    async fn two_backends() -> (JobsEngine, Arc<FakeBackend>, Arc<FakeBackend>) {
        let x = FakeBackend::new("FAKE 1.2");
        let y = FakeBackend::new("FAKE 1.0");
        let registry = AdaptorRegistry::builder()
            .register(fake_adaptor_with("x", &["x"], &x))
            .register(fake_adaptor_with("y", &["y"], &y))
            .build()
            .unwrap();
        (JobsEngine::new(Arc::new(registry)), x, y)
    }

    #[tokio::test(start_paused = true)]
    async fn batch_keeps_positions_and_isolates_failures() {
        let (engine, _x, y) = two_backends().await;
        let sx = engine.new_scheduler("x", "", None, HashMap::new()).await.unwrap();
        let sy = engine.new_scheduler("Y", "", None, HashMap::new()).await.unwrap();

        let x1 = engine.submit_job(&sx, &description()).await.unwrap();
        let y1 = engine.submit_job(&sy, &description()).await.unwrap();
        let x2 = engine.submit_job(&sx, &description()).await.unwrap();
        y.break_listing();

        let statuses = engine
            .get_job_statuses(&[Some(x1.clone()), Some(y1.clone()), None, Some(x2.clone())])
            .await;

        assert_eq!(statuses.len(), 4);
        let first = statuses[0].as_ref().unwrap();
        assert_eq!(first.job(), &x1);
        assert_eq!(first.state(), Some(JobState::Running));
        let second = statuses[1].as_ref().unwrap();
        assert_eq!(second.job(), &y1);
        assert!(second.has_exception());
        assert!(statuses[2].is_none());
        let fourth = statuses[3].as_ref().unwrap();
        assert_eq!(fourth.job(), &x2);
        assert!(!fourth.has_exception());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_of_nothing() {
        let (engine, ..) = two_backends().await;
        assert!(engine.get_job_statuses(&[]).await.is_empty());
        assert_eq!(engine.get_job_statuses(&[None, None]).await, vec![None, None]);
    }

    #[tokio::test(start_paused = true)]
    async fn lists_adaptors() {
        let (engine, ..) = two_backends().await;
        let names: Vec<_> = engine.adaptors().into_iter().map(|a| a.name).collect();
        assert_eq!(names, ["x", "y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_scheme_and_closed_scheduler() {
        let (engine, ..) = two_backends().await;
        let err = engine
            .new_scheduler("pbs", "", None, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobsError::NoSuchScheduler(_)));

        let props = HashMap::from([("bogus".to_owned(), "1".to_owned())]);
        let err = engine.new_scheduler("x", "", None, props).await.unwrap_err();
        assert!(matches!(err, JobsError::InvalidProperty { .. }));

        let sx = engine.new_scheduler("x", "", None, HashMap::new()).await.unwrap();
        engine.close(&sx).await.unwrap();
        assert!(matches!(engine.close(&sx).await, Err(JobsError::NotConnected(_))));
        assert!(matches!(
            engine.submit_job(&sx, &description()).await,
            Err(JobsError::NotConnected(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn all_queues_when_none_named() {
        let (engine, ..) = two_backends().await;
        let sx = engine.new_scheduler("x", "", None, HashMap::new()).await.unwrap();
        assert_eq!(engine.queue_names(&sx).unwrap(), ["default", "big"]);

        let statuses = engine.get_queue_statuses(&sx, &[]).await.unwrap();
        let names: Vec<_> = statuses.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["default", "big"]);
        assert!(statuses.iter().all(|s| s.exception().is_none()));
    }
}
