pub mod dialect;
pub mod models;

use std::sync::Arc;

use service::prelude::*;

pub use self::dialect::*;

pub const ADAPTOR_NAME: &str = "gridengine";

pub fn adaptor(executors: Arc<dyn ExecutorProvider>) -> ConnectionAdaptor<ScriptingFactory> {
    ConnectionAdaptor::new(
        ADAPTOR_NAME,
        "Submits jobs to a (Sun/Oracle/Univa) Grid Engine scheduler, locally or over ssh.",
        &["ge", "sge"],
        ScriptingFactory::new(Arc::new(GridEngineDialect::new()), executors),
    )
}
