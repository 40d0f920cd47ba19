use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use domain::{service::Adaptor, JobsError, Result};

static GLOBAL: OnceLock<Arc<AdaptorRegistry>> = OnceLock::new();

/// Scheme to adaptor table. Built once, read-only afterwards.
pub struct AdaptorRegistry {
    adaptors: Vec<Arc<dyn Adaptor>>,
    by_scheme: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

#[derive(Default)]
pub struct AdaptorRegistryBuilder {
    adaptors: Vec<Arc<dyn Adaptor>>,
}

impl AdaptorRegistry {
    pub fn builder() -> AdaptorRegistryBuilder {
        AdaptorRegistryBuilder::default()
    }

    /// Makes this registry the process-wide one. Only the first call wins.
    pub fn install(self) -> Result<()> {
        GLOBAL
            .set(Arc::new(self))
            .map_err(|_| JobsError::InvalidArgument("adaptor registry already installed".into()))
    }

    /// The registry installed at startup.
    pub fn global() -> Result<Arc<Self>> {
        GLOBAL
            .get()
            .cloned()
            .ok_or_else(|| JobsError::InvalidArgument("no adaptor registry installed".into()))
    }

    pub fn resolve(&self, scheme: &str) -> Result<&Arc<dyn Adaptor>> {
        self.by_scheme
            .get(&scheme.to_ascii_lowercase())
            .map(|&i| &self.adaptors[i])
            .ok_or_else(|| JobsError::NoSuchScheduler(format!("no adaptor for scheme {scheme:?}")))
    }

    pub fn by_name(&self, name: &str) -> Result<&Arc<dyn Adaptor>> {
        self.by_name
            .get(name)
            .map(|&i| &self.adaptors[i])
            .ok_or_else(|| JobsError::NoSuchScheduler(format!("no adaptor named {name:?}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Adaptor>> {
        self.adaptors.iter()
    }
}

impl AdaptorRegistryBuilder {
    pub fn register(self, adaptor: impl Adaptor + 'static) -> Self {
        self.register_arc(Arc::new(adaptor))
    }

    pub fn register_arc(mut self, adaptor: Arc<dyn Adaptor>) -> Self {
        self.adaptors.push(adaptor);
        self
    }

    /// Fails when two adaptors share a name or a scheme.
    pub fn build(self) -> Result<AdaptorRegistry> {
        let mut by_scheme = HashMap::new();
        let mut by_name = HashMap::new();

        for (i, adaptor) in self.adaptors.iter().enumerate() {
            if by_name.insert(adaptor.name().to_owned(), i).is_some() {
                return Err(JobsError::InvalidArgument(format!(
                    "adaptor {} registered twice",
                    adaptor.name()
                )));
            }
            for scheme in adaptor.schemes() {
                if by_scheme.insert(scheme.to_ascii_lowercase(), i).is_some() {
                    return Err(JobsError::InvalidArgument(format!(
                        "scheme {scheme} claimed by more than one adaptor"
                    )));
                }
            }
        }

        Ok(AdaptorRegistry {
            adaptors: self.adaptors,
            by_scheme,
            by_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::JobsEngine;
    use crate::testing::fake_adaptor;

    #[test]
    fn resolves_scheme_and_name() {
        let registry = AdaptorRegistry::builder()
            .register(fake_adaptor("x", &["x", "xx"]))
            .register(fake_adaptor("y", &["y"]))
            .build()
            .unwrap();

        assert_eq!(registry.resolve("XX").unwrap().name(), "x");
        assert_eq!(registry.by_name("y").unwrap().name(), "y");
        assert!(matches!(registry.resolve("z").err(), Some(JobsError::NoSuchScheduler(_))));
        assert_eq!(registry.iter().count(), 2);
    }

    // The only test touching the process-wide registry.
    #[test]
    fn installs_once() {
        let registry = AdaptorRegistry::builder()
            .register(fake_adaptor("x", &["x"]))
            .build()
            .unwrap();
        registry.install().unwrap();

        let again = AdaptorRegistry::builder().build().unwrap();
        assert!(again.install().is_err());

        let engine = JobsEngine::global().unwrap();
        assert_eq!(engine.adaptors().len(), 1);
        assert_eq!(AdaptorRegistry::global().unwrap().resolve("x").unwrap().name(), "x");
    }

    #[test]
    fn rejects_scheme_clash() {
        let built = AdaptorRegistry::builder()
            .register(fake_adaptor("x", &["s"]))
            .register(fake_adaptor("y", &["s"]))
            .build();
        assert!(built.is_err());
    }
}
