use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use domain::{JobsError, Result};

/// Typed view over the string properties a scheduler was opened with.
///
/// Names match case-insensitively, as configuration loaders may fold them
/// to lower case.
pub struct Properties<'a> {
    values: HashMap<String, &'a str>,
}

impl<'a> Properties<'a> {
    /// Fails on any key outside `known`.
    pub fn new(adaptor: &str, map: &'a HashMap<String, String>, known: &[&str]) -> Result<Self> {
        let mut values = HashMap::with_capacity(map.len());
        for (key, value) in map {
            let Some(name) = known.iter().find(|k| k.eq_ignore_ascii_case(key)) else {
                return Err(JobsError::InvalidProperty {
                    name: key.clone(),
                    reason: format!("not supported by the {adaptor} adaptor"),
                });
            };
            if values.insert((*name).to_owned(), value.as_str()).is_some() {
                return Err(JobsError::InvalidProperty {
                    name: key.clone(),
                    reason: "given more than once".to_owned(),
                });
            }
        }
        Ok(Self { values })
    }

    pub fn get<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.values.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| JobsError::InvalidProperty {
                name: name.to_owned(),
                reason: format!("{raw:?}: {e}"),
            }),
        }
    }

    pub fn millis(&self, name: &str, default: Duration) -> Result<Duration> {
        let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.get(name, default).map(Duration::from_millis)
    }
}
