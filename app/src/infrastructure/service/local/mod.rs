mod connection;
mod runner;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    model::entity::Scheduler,
    service::SchedulerConnection,
    JobsError, Result,
};
use service::prelude::*;

pub use self::connection::LocalConnection;

pub const ADAPTOR_NAME: &str = "local";

pub const POLL_DELAY: &str = "pollDelayMs";
pub const MAX_CONCURRENT_JOBS: &str = "maxConcurrentJobs";

/// `single` runs one job at a time, `multi` up to `maxConcurrentJobs`.
pub const QUEUES: [&str; 3] = ["single", "multi", "unlimited"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub poll_delay: Duration,
    pub max_concurrent_jobs: usize,
}

impl LocalConfig {
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let props = Properties::new(ADAPTOR_NAME, properties, &[POLL_DELAY, MAX_CONCURRENT_JOBS])?;
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        let config = Self {
            poll_delay: props.millis(POLL_DELAY, Duration::from_secs(1))?,
            max_concurrent_jobs: props.get(MAX_CONCURRENT_JOBS, cpus)?,
        };
        if config.poll_delay.is_zero() || config.max_concurrent_jobs == 0 {
            return Err(JobsError::InvalidProperty {
                name: if config.poll_delay.is_zero() { POLL_DELAY } else { MAX_CONCURRENT_JOBS }.to_owned(),
                reason: "must be positive".to_owned(),
            });
        }
        Ok(config)
    }
}

pub struct LocalFactory;

#[async_trait::async_trait]
impl ConnectionFactory for LocalFactory {
    async fn open(&self, scheduler: Scheduler) -> Result<Arc<dyn SchedulerConnection>> {
        let location = scheduler.location().trim();
        if !location.is_empty() && location != "localhost" {
            return Err(JobsError::InvalidLocation(format!(
                "{location}: the local adaptor only runs jobs on this machine"
            )));
        }
        let config = LocalConfig::from_properties(scheduler.properties())?;
        Ok(Arc::new(LocalConnection::new(scheduler, config)))
    }
}

pub fn adaptor() -> ConnectionAdaptor<LocalFactory> {
    ConnectionAdaptor::new(
        ADAPTOR_NAME,
        "Runs jobs as child processes of the agent.",
        &["local"],
        LocalFactory,
    )
}
