pub mod dialect;
pub mod models;

use std::sync::Arc;

use service::prelude::*;

pub use self::dialect::*;

pub const ADAPTOR_NAME: &str = "slurm";

pub fn adaptor(executors: Arc<dyn ExecutorProvider>) -> ConnectionAdaptor<ScriptingFactory> {
    ConnectionAdaptor::new(
        ADAPTOR_NAME,
        "Submits jobs to a Slurm cluster through its command line tools, locally or over ssh.",
        &["slurm"],
        ScriptingFactory::new(Arc::new(SlurmDialect), executors),
    )
}
