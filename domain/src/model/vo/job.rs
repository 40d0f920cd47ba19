use std::collections::HashMap;

use serde::Deserialize;
use typed_builder::TypedBuilder;

use crate::error::{JobsError, Result};

/// What to run and with which resources.
///
/// Multi-word fields also accept their lower case spelling, which is what
/// case folding configuration loaders hand over.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    #[builder(setter(into))]
    pub executable: String,

    #[serde(default)]
    #[builder(default)]
    pub arguments: Vec<String>,

    #[serde(default)]
    #[builder(default)]
    pub environment: HashMap<String, String>,

    #[serde(default, alias = "workingdirectory")]
    #[builder(default, setter(strip_option, into))]
    pub working_directory: Option<String>,

    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub stdin: Option<String>,

    #[serde(default = "JobDescription::default_stdout")]
    #[builder(default = JobDescription::default_stdout(), setter(into))]
    pub stdout: String,

    #[serde(default = "JobDescription::default_stderr")]
    #[builder(default = JobDescription::default_stderr(), setter(into))]
    pub stderr: String,

    #[serde(default = "JobDescription::default_count", alias = "nodecount")]
    #[builder(default = 1)]
    pub node_count: u32,

    #[serde(default = "JobDescription::default_count", alias = "processespernode")]
    #[builder(default = 1)]
    pub processes_per_node: u32,

    /// Wall time limit in minutes, 0 leaves it to the backend.
    #[serde(default = "JobDescription::default_max_time", alias = "maxtime")]
    #[builder(default = JobDescription::default_max_time())]
    pub max_time: u32,

    #[serde(default, alias = "queuename")]
    #[builder(default, setter(strip_option, into))]
    pub queue_name: Option<String>,

    /// Adaptor specific options, e.g. `parallel.environment`.
    #[serde(default, alias = "joboptions")]
    #[builder(default)]
    pub job_options: HashMap<String, String>,

    #[serde(default)]
    #[builder(default)]
    pub interactive: bool,

    /// Processes of a multi-process job share one stdout and one stderr.
    #[serde(default = "JobDescription::default_merge_output", alias = "mergeoutput")]
    #[builder(default = true)]
    pub merge_output: bool,
}

impl JobDescription {
    pub fn default_stdout() -> String {
        "stdout.txt".to_owned()
    }

    pub fn default_stderr() -> String {
        "stderr.txt".to_owned()
    }

    pub fn default_count() -> u32 {
        1
    }

    pub fn default_max_time() -> u32 {
        30
    }

    pub fn default_merge_output() -> bool {
        true
    }

    /// Total number of processes the job asks for.
    pub fn slots(&self) -> u32 {
        self.node_count.saturating_mul(self.processes_per_node)
    }

    /// Checks shared by every adaptor. Backends add their own on top.
    pub fn validate(&self) -> Result<()> {
        if self.executable.trim().is_empty() {
            return Err(JobsError::invalid_description("executable missing"));
        }
        if self.node_count == 0 {
            return Err(JobsError::invalid_description("node count must be positive"));
        }
        if self.processes_per_node == 0 {
            return Err(JobsError::invalid_description(
                "processes per node must be positive",
            ));
        }
        if self.stdout.is_empty() || self.stderr.is_empty() {
            return Err(JobsError::invalid_description("empty output redirection"));
        }
        if let Some(queue) = &self.queue_name {
            if !is_plausible_queue_name(queue) {
                return Err(JobsError::invalid_description(format!(
                    "implausible queue name {queue:?}"
                )));
            }
        }
        if let Some(key) = self.environment.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(JobsError::invalid_description(format!(
                "bad environment variable name {key:?}"
            )));
        }
        Ok(())
    }
}

fn is_plausible_queue_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
}
