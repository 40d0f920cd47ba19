use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use domain::model::{entity::Credential, vo::JobDescription};
use serde::*;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "JOBS_AGENT_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "AgentConfig::default_log_level")]
    pub log_level: String,

    /// Seconds between two status reports.
    #[serde(default = "AgentConfig::default_refresh_interval")]
    pub refresh_interval: u64,

    #[serde(default)]
    pub schedulers: HashMap<String, SchedulerEntry>,

    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerEntry {
    pub scheme: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub credential: Option<Credential>,

    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobEntry {
    /// Key into [`AgentConfig::schedulers`].
    pub scheduler: String,

    /// `NAME=value` pairs added to the job's environment. The loader folds
    /// map keys to lower case, so variable names only keep their case here.
    #[serde(default)]
    pub env: Vec<String>,

    #[serde(flatten)]
    pub description: JobDescription,
}

impl JobEntry {
    /// The description to submit, with `env` folded into its environment.
    pub fn job_description(&self) -> anyhow::Result<JobDescription> {
        let mut description = self.description.clone();
        for pair in &self.env {
            let (name, value) = pair
                .split_once('=')
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| anyhow::anyhow!("env entry {pair:?} is not NAME=value"))?;
            description.environment.insert(name.to_owned(), value.to_owned());
        }
        Ok(description)
    }
}

impl AgentConfig {
    pub fn default_log_level() -> String {
        "info".to_owned()
    }

    pub fn default_refresh_interval() -> u64 {
        10
    }
}

/// Reads `config.yaml` (or the file named by `JOBS_AGENT_CONFIG`) and applies
/// `JOBS_AGENT__*` overrides on top.
pub fn build_config() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "config.yaml".to_owned());
    Config::builder()
        .add_source(File::with_name(&path).required(false))
        .add_source(Environment::with_prefix("JOBS_AGENT").separator("__"))
        .build()
}
