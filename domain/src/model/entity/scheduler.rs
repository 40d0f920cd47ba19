use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

/// Reference to the identity used when talking to a backend.
///
/// Acquiring or unlocking the secret behind it is the transport's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "identityfile")]
    pub identity_file: Option<PathBuf>,
}

/// Handle to an open scheduler connection.
///
/// Cheap to clone; two handles are equal only when they name the same
/// connection, even if scheme and location match.
#[derive(Debug, Clone)]
pub struct Scheduler {
    id: Uuid,
    adaptor_name: Arc<str>,
    scheme: Arc<str>,
    location: Arc<str>,
    credential: Option<Arc<Credential>>,
    properties: Arc<HashMap<String, String>>,
}

impl Scheduler {
    pub fn new(
        adaptor_name: &str,
        scheme: &str,
        location: &str,
        credential: Option<Credential>,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            adaptor_name: Arc::from(adaptor_name),
            scheme: Arc::from(scheme),
            location: Arc::from(location),
            credential: credential.map(Arc::new),
            properties: Arc::new(properties),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn adaptor_name(&self) -> &str {
        &self.adaptor_name
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_deref()
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}

impl PartialEq for Scheduler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Scheduler {}

impl Hash for Scheduler {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_per_connection() {
        let a = Scheduler::new("gridengine", "ge", "head", None, HashMap::new());
        let b = Scheduler::new("gridengine", "ge", "head", None, HashMap::new());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.to_string(), "ge://head");
    }
}
