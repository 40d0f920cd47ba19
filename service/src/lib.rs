pub mod adaptor;
pub mod engine;
pub mod properties;
pub mod registry;
pub mod scripting;

#[cfg(test)]
mod testing;

pub mod prelude {
    #[rustfmt::skip]
    pub use super::{
        adaptor::{ConnectionAdaptor, ConnectionFactory},
        engine::{AdaptorInfo, JobsEngine},
        properties::Properties,
        registry::{AdaptorRegistry, AdaptorRegistryBuilder},
        scripting::{ExecutorProvider, ScriptingConfig, ScriptingConnection, ScriptingFactory},
    };
}
