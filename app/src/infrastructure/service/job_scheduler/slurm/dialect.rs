use std::collections::HashMap;

use chrono::NaiveDateTime;
use domain::{
    model::{entity::JobState, vo::JobDescription},
    service::{AccountingRecord, CommandLine, CommandOutput, ListingEntry, Queues, SchedulerDialect},
    JobsError, Result,
};
use indoc::formatdoc;

use super::models::{reader, SacctRecord, SqueueRow};
use crate::infrastructure::command::quote;
use crate::infrastructure::service::job_scheduler::{check_options, exports, invocation, wall_time, JOB_NAME};

/// Slurm's `sbatch`/`squeue`/`sacct` tool set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlurmDialect;

/// States after which squeue may still list a job for a while.
const FINISHED: &[&str] = &[
    "BOOT_FAIL",
    "CANCELLED",
    "COMPLETED",
    "DEADLINE",
    "FAILED",
    "NODE_FAIL",
    "OUT_OF_MEMORY",
    "PREEMPTED",
    "REVOKED",
    "SPECIAL_EXIT",
    "TIMEOUT",
];

const PENDING: &[&str] = &["PENDING", "CONFIGURING", "REQUEUED", "REQUEUE_HOLD", "RESV_DEL_HOLD"];

impl SlurmDialect {
    fn render(&self, description: &JobDescription) -> String {
        let mut header = format!("#SBATCH --job-name={JOB_NAME}\n");
        if let Some(dir) = &description.working_directory {
            header += &format!("#SBATCH --chdir={}\n", quote(dir));
        }
        if let Some(queue) = &description.queue_name {
            header += &format!("#SBATCH --partition={queue}\n");
        }
        header += &format!("#SBATCH --nodes={}\n", description.node_count);
        header += &format!("#SBATCH --ntasks-per-node={}\n", description.processes_per_node);
        if description.max_time > 0 {
            header += &format!("#SBATCH --time={}\n", wall_time(description.max_time));
        }
        if let Some(stdin) = &description.stdin {
            header += &format!("#SBATCH --input={}\n", quote(stdin));
        }
        header += &format!("#SBATCH --output={}\n", quote(&description.stdout));
        header += &format!("#SBATCH --error={}\n", quote(&description.stderr));

        let env = exports(description);
        let script = invocation(description);
        let script = if description.slots() > 1 && !description.merge_output {
            let out = quote(&format!("{}.%t", description.stdout)).into_owned();
            let err = quote(&format!("{}.%t", description.stderr)).into_owned();
            format!("srun --output={out} --error={err} {script}")
        } else if description.slots() > 1 {
            format!("srun {script}")
        } else {
            script
        };

        formatdoc! {r#"
            #!/bin/sh
            {header}
            {env}
            {script}
        "#}
    }
}

impl SchedulerDialect for SlurmDialect {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn supported_versions(&self) -> &[&'static str] {
        &["slurm 20.", "slurm 21.", "slurm 22.", "slurm 23.", "slurm 24."]
    }

    fn version_command(&self) -> CommandLine {
        CommandLine::new("sinfo").arg("--version")
    }

    fn parse_version(&self, output: &CommandOutput) -> Result<String> {
        let stdout = output.stdout_str();
        match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(version) if output.success() => Ok(version.to_owned()),
            _ => Err(JobsError::unknown(format!(
                "cannot read slurm version: {}",
                output.stderr_str().trim()
            ))),
        }
    }

    fn submit_command(&self, description: &JobDescription) -> Result<CommandLine> {
        check_options(description, &[])?;
        Ok(CommandLine::new("sbatch").stdin(self.render(description)))
    }

    fn parse_submit(&self, stdout: &str) -> Result<String> {
        stdout
            .lines()
            .find_map(|l| l.trim().strip_prefix("Submitted batch job "))
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| JobsError::unknown(format!("unexpected sbatch output {stdout:?}")))
    }

    fn listing_command(&self) -> CommandLine {
        CommandLine::new("squeue").args(["-h", "-o", "%i|%T|%P"])
    }

    fn parse_listing(&self, stdout: &str) -> Result<HashMap<String, ListingEntry>> {
        let mut jobs = HashMap::new();
        for row in reader(stdout.as_bytes(), false).deserialize() {
            let row: SqueueRow = row.map_err(|e| JobsError::unknown(format!("bad squeue output: {e}")))?;
            if FINISHED.contains(&row.state.as_str()) {
                continue;
            }
            let state = if PENDING.contains(&row.state.as_str()) {
                JobState::Pending
            } else {
                JobState::Running
            };
            let info = HashMap::from([("state".to_owned(), row.state)]);
            jobs.insert(
                row.job_id,
                ListingEntry {
                    state,
                    queue: Some(row.partition),
                    failure: None,
                    info,
                },
            );
        }
        Ok(jobs)
    }

    fn accounting_command(&self, job_id: &str) -> CommandLine {
        CommandLine::new("sacct").args(["-PX", "-o", "JobID,State,ExitCode,End", "-j", job_id])
    }

    fn parse_accounting(
        &self,
        job_id: &str,
        output: &CommandOutput,
    ) -> Result<Option<AccountingRecord>> {
        if !output.success() {
            tracing::debug!(job_id, stderr = %output.stderr_str().trim(), "sacct has no answer");
            return Ok(None);
        }
        let mut found = None;
        for record in reader(&output.stdout, true).deserialize() {
            let record: SacctRecord =
                record.map_err(|e| JobsError::unknown(format!("bad sacct output: {e}")))?;
            if record.job_id == job_id {
                found = Some(record);
            }
        }
        let Some(record) = found else { return Ok(None) };

        // `CANCELLED by 1000`
        let state = record.state.split_whitespace().next().unwrap_or_default();
        if !FINISHED.contains(&state) {
            return Ok(None);
        }
        let exit_code = record
            .exit_code
            .split(':')
            .next()
            .and_then(|code| code.parse().ok());
        let cancelled = state == "CANCELLED";
        let failure = match state {
            "COMPLETED" | "CANCELLED" => None,
            other => Some(other.to_owned()),
        };

        Ok(Some(AccountingRecord {
            exit_code,
            failure,
            cancelled,
            finish_time: NaiveDateTime::parse_from_str(&record.end, "%Y-%m-%dT%H:%M:%S").ok(),
            info: HashMap::from([
                ("state".to_owned(), record.state),
                ("exitCode".to_owned(), record.exit_code),
            ]),
        }))
    }

    fn cancel_command(&self, job_id: &str) -> CommandLine {
        CommandLine::new("scancel").arg(job_id)
    }

    fn queues_command(&self) -> CommandLine {
        CommandLine::new("sinfo").args(["-h", "-o", "%P"])
    }

    fn parse_queues(&self, stdout: &str) -> Result<Queues> {
        let mut queues = Queues::default();
        for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let name = match line.strip_suffix('*') {
                Some(name) => {
                    queues.default = Some(name.to_owned());
                    name
                }
                None => line,
            };
            if !queues.names.iter().any(|n| n == name) {
                queues.names.push(name.to_owned());
            }
        }
        Ok(queues)
    }

    fn queue_status_command(&self, queue: &str) -> CommandLine {
        CommandLine::new("scontrol").args(["-o", "show", "partition", queue])
    }

    fn parse_queue_status(&self, stdout: &str) -> Result<HashMap<String, String>> {
        let properties: HashMap<_, _> = stdout
            .split_whitespace()
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        if properties.is_empty() {
            return Err(JobsError::unknown(format!("unexpected scontrol output {stdout:?}")));
        }
        Ok(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn output(stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn version() {
        let version = SlurmDialect.parse_version(&output("slurm 23.02.6\n")).unwrap();
        assert!(SlurmDialect.is_supported(&version));
        assert!(!SlurmDialect.is_supported("slurm 17.11.2"));
    }

    #[test]
    fn render_script() {
        let description = JobDescription::builder()
            .executable("/bin/hostname")
            .arguments(vec!["-f".to_owned()])
            .working_directory("/scratch/run 1")
            .queue_name("short")
            .node_count(2)
            .processes_per_node(4)
            .max_time(90)
            .build();
        let command = SlurmDialect.submit_command(&description).unwrap();
        assert_eq!(command.program, "sbatch");
        let script = command.stdin.unwrap();
        assert!(script.starts_with("#!/bin/sh\n#SBATCH --job-name=jobs-agent\n"));
        assert!(script.contains("#SBATCH --chdir='/scratch/run 1'\n"));
        assert!(script.contains("#SBATCH --partition=short\n"));
        assert!(script.contains("#SBATCH --nodes=2\n#SBATCH --ntasks-per-node=4\n"));
        assert!(script.contains("#SBATCH --time=01:30:00\n"));
        assert!(script.contains("#SBATCH --output=stdout.txt\n#SBATCH --error=stderr.txt\n"));
        assert!(script.contains("srun /bin/hostname -f\n"));
    }

    #[test]
    fn unknown_option_rejected() {
        let description = JobDescription::builder()
            .executable("a")
            .job_options([("parallel.environment".to_owned(), "mpi".to_owned())].into())
            .build();
        assert!(matches!(
            SlurmDialect.submit_command(&description),
            Err(JobsError::InvalidJobDescription(_))
        ));
    }

    #[test]
    fn submit_output() {
        assert_eq!(SlurmDialect.parse_submit("Submitted batch job 4711\n").unwrap(), "4711");
        assert!(SlurmDialect.parse_submit("sbatch: error: Batch job submission failed").is_err());
    }

    #[test]
    fn listing() {
        let stdout = indoc! {"
            101|RUNNING|debug
            102|PENDING|long
            103|COMPLETED|debug
            104|COMPLETING|debug
        "};
        let jobs = SlurmDialect.parse_listing(stdout).unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs["101"].state, JobState::Running);
        assert_eq!(jobs["102"].state, JobState::Pending);
        assert_eq!(jobs["102"].queue.as_deref(), Some("long"));
        assert_eq!(jobs["104"].state, JobState::Running);
        assert!(!jobs.contains_key("103"));
    }

    #[test]
    fn accounting() {
        let done = output(indoc! {"
            JobID|State|ExitCode|End
            101|COMPLETED|0:0|2026-10-19T10:00:10
        "});
        let record = SlurmDialect.parse_accounting("101", &done).unwrap().unwrap();
        assert_eq!(record.exit_code, Some(0));
        assert_eq!(record.state(), JobState::Done);
        assert_eq!(
            record.finish_time.unwrap().to_string(),
            "2026-10-19 10:00:10"
        );

        let failed = output(indoc! {"
            JobID|State|ExitCode|End
            102|FAILED|2:0|2026-10-19T10:00:10
        "});
        let record = SlurmDialect.parse_accounting("102", &failed).unwrap().unwrap();
        assert_eq!(record.exit_code, Some(2));
        assert_eq!(record.failure.as_deref(), Some("FAILED"));
        assert_eq!(record.state(), JobState::Error);

        let cancelled = output(indoc! {"
            JobID|State|ExitCode|End
            103|CANCELLED by 1000|0:15|2026-10-19T10:00:10
        "});
        let record = SlurmDialect.parse_accounting("103", &cancelled).unwrap().unwrap();
        assert!(record.cancelled);
        assert!(matches!(record.error("103"), Some(JobsError::Cancelled(_))));

        let running = output("JobID|State|ExitCode|End\n104|RUNNING|0:0|Unknown\n");
        assert_eq!(SlurmDialect.parse_accounting("104", &running).unwrap(), None);

        let missing = output("JobID|State|ExitCode|End\n");
        assert_eq!(SlurmDialect.parse_accounting("105", &missing).unwrap(), None);

        let disabled = CommandOutput {
            exit_code: 1,
            stdout: Vec::new(),
            stderr: b"Slurm accounting storage is disabled".to_vec(),
        };
        assert_eq!(SlurmDialect.parse_accounting("106", &disabled).unwrap(), None);
    }

    #[test]
    fn queues() {
        let queues = SlurmDialect.parse_queues("debug*\nlong\ndebug*\n").unwrap();
        assert_eq!(queues.names, ["debug", "long"]);
        assert_eq!(queues.default.as_deref(), Some("debug"));

        let status = SlurmDialect
            .parse_queue_status("PartitionName=debug AllowGroups=ALL Default=YES MaxTime=UNLIMITED State=UP\n")
            .unwrap();
        assert_eq!(status["State"], "UP");
        assert!(SlurmDialect.parse_queue_status("").is_err());
    }
}
