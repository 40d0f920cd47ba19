use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use domain::{
    model::{
        entity::{Credential, Job, Scheduler},
        vo::JobStatus,
    },
    service::{Adaptor, SchedulerConnection},
    JobsError, Result,
};
use futures::future::join_all;
use uuid::Uuid;

/// Opens connections for a [`ConnectionAdaptor`].
#[async_trait::async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self, scheduler: Scheduler) -> Result<Arc<dyn SchedulerConnection>>;
}

/// Adaptor keeping one connection per open scheduler.
pub struct ConnectionAdaptor<F> {
    name: &'static str,
    description: &'static str,
    schemes: &'static [&'static str],
    factory: F,
    connections: DashMap<Uuid, Arc<dyn SchedulerConnection>>,
}

impl<F> ConnectionAdaptor<F> {
    pub fn new(
        name: &'static str,
        description: &'static str,
        schemes: &'static [&'static str],
        factory: F,
    ) -> Self {
        Self {
            name,
            description,
            schemes,
            factory,
            connections: DashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl<F> Adaptor for ConnectionAdaptor<F>
where
    F: ConnectionFactory,
{
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn schemes(&self) -> &[&'static str] {
        self.schemes
    }

    async fn new_scheduler(
        &self,
        scheme: &str,
        location: &str,
        credential: Option<Credential>,
        properties: HashMap<String, String>,
    ) -> Result<Scheduler> {
        if !self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
            return Err(JobsError::NoSuchScheduler(format!(
                "{} adaptor does not handle scheme {scheme:?}",
                self.name
            )));
        }
        let scheduler = Scheduler::new(self.name, scheme, location, credential, properties);
        let connection = self.factory.open(scheduler.clone()).await?;
        self.connections.insert(scheduler.id(), connection);
        tracing::info!(scheduler = %scheduler, adaptor = self.name, "Scheduler opened");
        Ok(scheduler)
    }

    fn connection(&self, scheduler: &Scheduler) -> Result<Arc<dyn SchedulerConnection>> {
        self.connections
            .get(&scheduler.id())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| JobsError::NotConnected(scheduler.to_string()))
    }

    async fn close(&self, scheduler: &Scheduler) -> Result<()> {
        let (_, connection) = self
            .connections
            .remove(&scheduler.id())
            .ok_or_else(|| JobsError::NotConnected(scheduler.to_string()))?;
        tracing::info!(scheduler = %scheduler, "Scheduler closed");
        connection.close().await
    }

    async fn get_job_statuses(&self, jobs: &[Option<Job>]) -> Result<Vec<Option<JobStatus>>> {
        // Group positions per connection, keeping first-seen order.
        let mut groups: Vec<(Uuid, Vec<usize>)> = Vec::new();
        for (i, job) in jobs.iter().enumerate() {
            let Some(job) = job else { continue };
            let id = job.scheduler().id();
            match groups.iter_mut().find(|(g, _)| *g == id) {
                Some((_, positions)) => positions.push(i),
                None => groups.push((id, vec![i])),
            }
        }

        let queries = groups.into_iter().map(|(_, positions)| async move {
            let batch: Vec<Job> = positions.iter().filter_map(|&i| jobs[i].clone()).collect();
            let outcome = match self.connection(batch[0].scheduler()) {
                Ok(connection) => connection.get_job_statuses(&batch).await,
                Err(e) => Err(e),
            };
            (positions, batch, outcome)
        });

        let mut statuses = vec![None; jobs.len()];
        for (positions, batch, outcome) in join_all(queries).await {
            match outcome {
                Ok(found) if found.len() == batch.len() => {
                    for (i, status) in positions.into_iter().zip(found) {
                        statuses[i] = Some(status);
                    }
                }
                Ok(found) => {
                    let e = JobsError::unknown(format!(
                        "backend answered {} statuses for {} jobs",
                        found.len(),
                        batch.len()
                    ));
                    for (i, job) in positions.into_iter().zip(batch) {
                        statuses[i] = Some(JobStatus::failed_retrieval(job, e.clone()));
                    }
                }
                Err(e) => {
                    tracing::debug!(adaptor = self.name, "Batched status failed: {e}");
                    for (i, job) in positions.into_iter().zip(batch) {
                        statuses[i] = Some(JobStatus::failed_retrieval(job, e.clone()));
                    }
                }
            }
        }
        Ok(statuses)
    }
}
