use std::collections::HashMap;
use std::time::Duration;

use domain::Result;

use crate::properties::Properties;

pub const IGNORE_VERSION_CHECK: &str = "ignoreVersionCheck";
pub const ACCOUNTING_GRACE_TIME: &str = "accountingGraceTimeMs";
pub const POLL_DELAY: &str = "pollDelayMs";
pub const ACCOUNTING_POLL_DELAY: &str = "accountingPollDelayMs";

pub const KNOWN_PROPERTIES: &[&str] = &[
    IGNORE_VERSION_CHECK,
    ACCOUNTING_GRACE_TIME,
    POLL_DELAY,
    ACCOUNTING_POLL_DELAY,
];

/// Tunables of a scripting connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptingConfig {
    /// Accept backend versions outside the supported set.
    pub ignore_version_check: bool,
    /// Upper bound on the wait for an accounting record once a job left the
    /// live listing.
    pub accounting_grace_time: Duration,
    /// Interval between live listing polls in wait loops.
    pub poll_delay: Duration,
    /// Minimum interval between accounting lookups of one job.
    pub accounting_poll_delay: Duration,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            ignore_version_check: false,
            accounting_grace_time: Duration::from_secs(60),
            poll_delay: Duration::from_secs(1),
            accounting_poll_delay: Duration::ZERO,
        }
    }
}

impl ScriptingConfig {
    pub fn from_properties(adaptor: &str, properties: &HashMap<String, String>) -> Result<Self> {
        let props = Properties::new(adaptor, properties, KNOWN_PROPERTIES)?;
        let default = Self::default();

        let config = Self {
            ignore_version_check: props.get(IGNORE_VERSION_CHECK, default.ignore_version_check)?,
            accounting_grace_time: props
                .millis(ACCOUNTING_GRACE_TIME, default.accounting_grace_time)?,
            poll_delay: props.millis(POLL_DELAY, default.poll_delay)?,
            accounting_poll_delay: props
                .millis(ACCOUNTING_POLL_DELAY, default.accounting_poll_delay)?,
        };
        if config.poll_delay.is_zero() {
            return Err(domain::JobsError::InvalidProperty {
                name: POLL_DELAY.to_owned(),
                reason: "must be positive".to_owned(),
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ScriptingConfig::from_properties("ge", &HashMap::new()).unwrap();
        assert_eq!(config, ScriptingConfig::default());
        assert_eq!(config.accounting_grace_time, Duration::from_millis(60000));
        assert_eq!(config.poll_delay, Duration::from_millis(1000));
    }

    #[test]
    fn overrides() {
        let props = HashMap::from([
            (IGNORE_VERSION_CHECK.to_owned(), "true".to_owned()),
            (ACCOUNTING_GRACE_TIME.to_owned(), "2000".to_owned()),
            (POLL_DELAY.to_owned(), "100".to_owned()),
        ]);
        let config = ScriptingConfig::from_properties("ge", &props).unwrap();
        assert!(config.ignore_version_check);
        assert_eq!(config.accounting_grace_time, Duration::from_secs(2));
        assert_eq!(config.poll_delay, Duration::from_millis(100));
    }

    #[test]
    fn zero_poll_delay_rejected() {
        let props = HashMap::from([(POLL_DELAY.to_owned(), "0".to_owned())]);
        assert!(ScriptingConfig::from_properties("ge", &props).is_err());
    }
}
