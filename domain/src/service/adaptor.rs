use std::collections::HashMap;
use std::sync::Arc;

use super::SchedulerConnection;
use crate::error::Result;
use crate::model::{
    entity::{Credential, Job, Scheduler},
    vo::JobStatus,
};

/// A backend family selected by URI scheme.
#[async_trait::async_trait]
pub trait Adaptor: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schemes(&self) -> &[&'static str];

    async fn new_scheduler(
        &self,
        scheme: &str,
        location: &str,
        credential: Option<Credential>,
        properties: HashMap<String, String>,
    ) -> Result<Scheduler>;

    /// The open connection behind `scheduler`.
    fn connection(&self, scheduler: &Scheduler) -> Result<Arc<dyn SchedulerConnection>>;

    async fn close(&self, scheduler: &Scheduler) -> Result<()>;

    /// Same length and order as `jobs`; `None` stays `None`.
    async fn get_job_statuses(&self, jobs: &[Option<Job>]) -> Result<Vec<Option<JobStatus>>>;
}
