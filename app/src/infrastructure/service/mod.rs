pub mod job_scheduler;
pub mod local;

use std::sync::Arc;

use service::prelude::*;

use self::job_scheduler::{gridengine, slurm};
use crate::infrastructure::command::ProcessExecutors;

/// Every adaptor this agent ships with.
pub fn registry() -> domain::Result<AdaptorRegistry> {
    let executors: Arc<dyn ExecutorProvider> = Arc::new(ProcessExecutors);
    AdaptorRegistry::builder()
        .register(local::adaptor())
        .register(gridengine::adaptor(executors.clone()))
        .register(slurm::adaptor(executors))
        .build()
}
