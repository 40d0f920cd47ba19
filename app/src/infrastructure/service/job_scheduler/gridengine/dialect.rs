use std::collections::HashMap;

use domain::{
    model::{entity::JobState, vo::JobDescription},
    service::{AccountingRecord, CommandLine, CommandOutput, ListingEntry, Queues, SchedulerDialect},
    JobsError, Result,
};
use indoc::formatdoc;
use regex::Regex;

use super::models::{key_values, last_qacct_record, parse_end_time, QstatRow};
use crate::infrastructure::command::quote;
use crate::infrastructure::service::job_scheduler::{check_options, exports, invocation, wall_time, JOB_NAME};

/// Job option naming the parallel environment multi-slot jobs run in.
pub const PARALLEL_ENVIRONMENT: &str = "parallel.environment";

/// Grid Engine's `qsub`/`qstat`/`qacct` tool set.
#[derive(Debug, Clone)]
pub struct GridEngineDialect {
    submitted: Regex,
}

impl Default for GridEngineDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl GridEngineDialect {
    pub fn new() -> Self {
        Self {
            // `Your job 4711 ("name") has been submitted`, `Your job-array 4711.1-3:1 ...`
            submitted: Regex::new(r"Your job(?:-array)? (?P<id>\d+)").expect("submit pattern is valid"),
        }
    }

    fn render(&self, description: &JobDescription) -> Result<String> {
        let slots = description.slots();
        let environment = description.job_options.get(PARALLEL_ENVIRONMENT);
        if slots > 1 && environment.is_none() {
            return Err(JobsError::invalid_description(format!(
                "{slots} slots need the {PARALLEL_ENVIRONMENT} job option"
            )));
        }
        if slots > 1 && !description.merge_output {
            return Err(JobsError::invalid_description(
                "grid engine always merges the output of parallel processes",
            ));
        }

        let mut header = format!("#$ -S /bin/sh\n#$ -N {JOB_NAME}\n");
        header += &match &description.working_directory {
            Some(dir) => format!("#$ -wd {}\n", quote(dir)),
            None => "#$ -cwd\n".to_owned(),
        };
        if let Some(queue) = &description.queue_name {
            header += &format!("#$ -q {queue}\n");
        }
        if let Some(environment) = environment {
            header += &format!("#$ -pe {} {slots}\n", quote(environment));
        }
        if description.max_time > 0 {
            header += &format!("#$ -l h_rt={}\n", wall_time(description.max_time));
        }
        if let Some(stdin) = &description.stdin {
            header += &format!("#$ -i {}\n", quote(stdin));
        }
        header += &format!("#$ -o {}\n", quote(&description.stdout));
        header += &format!("#$ -e {}\n", quote(&description.stderr));

        let env = exports(description);
        let script = invocation(description);
        Ok(formatdoc! {r#"
            #!/bin/sh
            {header}
            {env}
            {script}
        "#})
    }
}

impl SchedulerDialect for GridEngineDialect {
    fn name(&self) -> &'static str {
        "gridengine"
    }

    fn supported_versions(&self) -> &[&'static str] {
        &["GE 6.2", "SGE 8.1"]
    }

    fn version_command(&self) -> CommandLine {
        CommandLine::new("qconf").arg("-help")
    }

    /// First line of `qconf -help`. Its exit code varies between releases.
    fn parse_version(&self, output: &CommandOutput) -> Result<String> {
        output
            .stdout_str()
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                JobsError::unknown(format!(
                    "cannot read grid engine version: {}",
                    output.stderr_str().trim()
                ))
            })
    }

    fn submit_command(&self, description: &JobDescription) -> Result<CommandLine> {
        check_options(description, &[PARALLEL_ENVIRONMENT])?;
        Ok(CommandLine::new("qsub").stdin(self.render(description)?))
    }

    fn parse_submit(&self, stdout: &str) -> Result<String> {
        self.submitted
            .captures(stdout)
            .map(|c| c["id"].to_owned())
            .ok_or_else(|| JobsError::unknown(format!("unexpected qsub output {stdout:?}")))
    }

    fn listing_command(&self) -> CommandLine {
        CommandLine::new("qstat")
    }

    fn parse_listing(&self, stdout: &str) -> Result<HashMap<String, ListingEntry>> {
        stdout
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with("job-ID") && !l.starts_with("---"))
            .map(|line| {
                let row = QstatRow::parse(line)?;
                let state = row.job_state();
                let failure = (state == JobState::Error)
                    .then(|| format!("held in error state {}", row.state));
                let entry = ListingEntry {
                    state,
                    queue: row.queue,
                    failure,
                    info: HashMap::from([("state".to_owned(), row.state)]),
                };
                Ok((row.job_id, entry))
            })
            .collect()
    }

    fn accounting_command(&self, job_id: &str) -> CommandLine {
        CommandLine::new("qacct").args(["-j", job_id])
    }

    fn parse_accounting(
        &self,
        job_id: &str,
        output: &CommandOutput,
    ) -> Result<Option<AccountingRecord>> {
        if !output.success() {
            // `error: job id 4711 not found`
            tracing::debug!(job_id, stderr = %output.stderr_str().trim(), "qacct has no answer");
            return Ok(None);
        }
        let Some(info) = last_qacct_record(&output.stdout_str()) else {
            return Ok(None);
        };

        let exit_code = info.get("exit_status").and_then(|v| v.parse().ok());
        let failure = info
            .get("failed")
            .filter(|v| v.as_str() != "0")
            .cloned();
        let finish_time = info.get("end_time").and_then(|v| parse_end_time(v));

        Ok(Some(AccountingRecord {
            exit_code,
            failure,
            cancelled: false,
            finish_time,
            info,
        }))
    }

    fn cancel_command(&self, job_id: &str) -> CommandLine {
        CommandLine::new("qdel").arg(job_id)
    }

    fn queues_command(&self) -> CommandLine {
        CommandLine::new("qconf").arg("-sql")
    }

    /// Grid Engine has no default queue.
    fn parse_queues(&self, stdout: &str) -> Result<Queues> {
        Ok(Queues {
            names: stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
            default: None,
        })
    }

    fn queue_status_command(&self, queue: &str) -> CommandLine {
        CommandLine::new("qconf").args(["-sq", queue])
    }

    fn parse_queue_status(&self, stdout: &str) -> Result<HashMap<String, String>> {
        let properties = key_values(stdout);
        if properties.is_empty() {
            return Err(JobsError::unknown(format!("unexpected qconf output {stdout:?}")));
        }
        Ok(properties)
    }
}
