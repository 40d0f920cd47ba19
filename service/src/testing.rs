//! Scripted in-memory backend driving the engine in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use domain::{
    model::{
        entity::{JobState, Scheduler},
        vo::JobDescription,
    },
    service::{
        AccountingRecord, CommandExecutor, CommandLine, CommandOutput, ListingEntry, Queues,
        SchedulerDialect,
    },
    JobsError, Result,
};
use tokio::time::Instant;

use crate::adaptor::ConnectionAdaptor;
use crate::scripting::{ExecutorProvider, ScriptingFactory};

/// How a submitted job behaves.
#[derive(Debug, Clone, Copy)]
pub struct JobPlan {
    /// Listing polls that still show the job.
    pub visible_polls: u32,
    /// Delay between leaving the listing and the accounting record showing up.
    pub record_delay: Option<Duration>,
    pub exit_code: i32,
}

impl Default for JobPlan {
    fn default() -> Self {
        Self {
            visible_polls: 3,
            record_delay: Some(Duration::ZERO),
            exit_code: 0,
        }
    }
}

#[derive(Debug)]
struct FakeJob {
    plan: JobPlan,
    polls_left: u32,
    gone_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u32,
    plan: JobPlan,
    jobs: BTreeMap<String, FakeJob>,
    commands: Vec<String>,
    broken_listing: bool,
    held_in_error: bool,
    late_cancel_succeeds: bool,
    in_flight: usize,
    max_in_flight: usize,
}

pub struct FakeBackend {
    version: String,
    latency: Duration,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(version: &str) -> Arc<Self> {
        Self::with_latency(version, Duration::ZERO)
    }

    /// Every command takes `latency` to answer.
    pub fn with_latency(version: &str, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            version: version.to_owned(),
            latency,
            state: Mutex::new(FakeState {
                next_id: 1,
                ..Default::default()
            }),
        })
    }

    pub fn plan(&self, plan: JobPlan) {
        self.state.lock().unwrap().plan = plan;
    }

    pub fn break_listing(&self) {
        self.state.lock().unwrap().broken_listing = true;
    }

    /// Listed jobs show up in an error state from now on.
    pub fn hold_in_error(&self) {
        self.state.lock().unwrap().held_in_error = true;
    }

    /// Cancelling a job that already finished succeeds and keeps its record.
    pub fn accept_late_cancel(&self) {
        self.state.lock().unwrap().late_cancel_succeeds = true;
    }

    /// Most commands ever executing at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn gone_at(&self, id: &str) -> Option<Instant> {
        self.state.lock().unwrap().jobs.get(id)?.gone_at
    }

    fn reply(&self, command: &CommandLine) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());
        let now = Instant::now();
        let arg = command.args.first().cloned().unwrap_or_default();

        match command.program.as_str() {
            "version" => ok(&self.version),
            "queues" => ok("*default\nbig\n"),
            "queue" => ok("slots=4\nstate=open\n"),
            "submit" => {
                let id = state.next_id.to_string();
                state.next_id += 1;
                let plan = state.plan;
                state.jobs.insert(
                    id.clone(),
                    FakeJob {
                        plan,
                        polls_left: plan.visible_polls,
                        gone_at: None,
                    },
                );
                ok(&format!("job {id}\n"))
            }
            "list" if state.broken_listing => failed("listing broken"),
            "list" => {
                let shown = if state.held_in_error { "ERROR" } else { "RUNNING" };
                let mut out = String::new();
                for (id, job) in state.jobs.iter_mut().filter(|(_, j)| j.gone_at.is_none()) {
                    if job.polls_left == 0 {
                        job.gone_at = Some(now);
                    } else {
                        job.polls_left -= 1;
                        out += &format!("{id} {shown}\n");
                    }
                }
                ok(&out)
            }
            "acct" => match state.jobs.get(&arg) {
                Some(FakeJob {
                    plan:
                        JobPlan {
                            record_delay: Some(delay),
                            exit_code,
                            ..
                        },
                    gone_at: Some(gone),
                    ..
                }) if now >= *gone + *delay => ok(&format!("exit {exit_code}\n")),
                _ => failed("no record"),
            },
            "cancel" => {
                let late_cancel_succeeds = state.late_cancel_succeeds;
                match state.jobs.get_mut(&arg) {
                    Some(job) if job.gone_at.is_none() => {
                        job.gone_at = Some(now);
                        job.plan.record_delay = None;
                        ok("")
                    }
                    Some(_) if late_cancel_succeeds => ok(""),
                    _ => failed("unknown job"),
                }
            }
            other => failed(&format!("unknown command {other}")),
        }
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 1,
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

#[async_trait::async_trait]
impl CommandExecutor for FakeBackend {
    async fn execute(&self, command: &CommandLine) -> Result<CommandOutput> {
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let out = self.reply(command);
        self.state.lock().unwrap().in_flight -= 1;
        Ok(out)
    }
}

impl ExecutorProvider for Arc<FakeBackend> {
    fn executor(&self, _scheduler: &Scheduler) -> Result<Arc<dyn CommandExecutor>> {
        Ok(self.clone())
    }
}

impl SchedulerDialect for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supported_versions(&self) -> &[&'static str] {
        &["FAKE 1."]
    }

    fn version_command(&self) -> CommandLine {
        CommandLine::new("version")
    }

    fn parse_version(&self, output: &CommandOutput) -> Result<String> {
        Ok(output.stdout_str().trim().to_owned())
    }

    fn submit_command(&self, description: &JobDescription) -> Result<CommandLine> {
        Ok(CommandLine::new("submit").arg(&description.executable))
    }

    fn parse_submit(&self, stdout: &str) -> Result<String> {
        stdout
            .trim()
            .strip_prefix("job ")
            .map(ToOwned::to_owned)
            .ok_or_else(|| JobsError::unknown(format!("bad submit output {stdout:?}")))
    }

    fn listing_command(&self) -> CommandLine {
        CommandLine::new("list")
    }

    fn parse_listing(&self, stdout: &str) -> Result<HashMap<String, ListingEntry>> {
        stdout
            .lines()
            .map(|line| {
                let (id, state) = line
                    .split_once(' ')
                    .ok_or_else(|| JobsError::unknown(format!("bad listing line {line:?}")))?;
                let (state, failure) = match state {
                    "PENDING" => (JobState::Pending, None),
                    "ERROR" => (JobState::Error, Some("held by the backend".to_owned())),
                    _ => (JobState::Running, None),
                };
                let entry = ListingEntry {
                    state,
                    queue: Some("default".to_owned()),
                    failure,
                    info: HashMap::new(),
                };
                Ok((id.to_owned(), entry))
            })
            .collect()
    }

    fn accounting_command(&self, job_id: &str) -> CommandLine {
        CommandLine::new("acct").arg(job_id)
    }

    fn parse_accounting(
        &self,
        _job_id: &str,
        output: &CommandOutput,
    ) -> Result<Option<AccountingRecord>> {
        if !output.success() {
            return Ok(None);
        }
        let code = output
            .stdout_str()
            .trim()
            .strip_prefix("exit ")
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| JobsError::unknown("bad accounting output"))?;
        Ok(Some(AccountingRecord {
            exit_code: Some(code),
            ..Default::default()
        }))
    }

    fn cancel_command(&self, job_id: &str) -> CommandLine {
        CommandLine::new("cancel").arg(job_id)
    }

    fn queues_command(&self) -> CommandLine {
        CommandLine::new("queues")
    }

    fn parse_queues(&self, stdout: &str) -> Result<Queues> {
        let mut queues = Queues::default();
        for name in stdout.lines() {
            match name.strip_prefix('*') {
                Some(name) => {
                    queues.default = Some(name.to_owned());
                    queues.names.push(name.to_owned());
                }
                None => queues.names.push(name.to_owned()),
            }
        }
        Ok(queues)
    }

    fn queue_status_command(&self, queue: &str) -> CommandLine {
        CommandLine::new("queue").arg(queue)
    }

    fn parse_queue_status(&self, stdout: &str) -> Result<HashMap<String, String>> {
        Ok(stdout
            .lines()
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect())
    }
}

pub fn fake_factory(backend: &Arc<FakeBackend>) -> ScriptingFactory {
    ScriptingFactory::new(backend.clone(), Arc::new(backend.clone()))
}

pub fn fake_adaptor(
    name: &'static str,
    schemes: &'static [&'static str],
) -> ConnectionAdaptor<ScriptingFactory> {
    fake_adaptor_with(name, schemes, &FakeBackend::new("FAKE 1.0"))
}

pub fn fake_adaptor_with(
    name: &'static str,
    schemes: &'static [&'static str],
    backend: &Arc<FakeBackend>,
) -> ConnectionAdaptor<ScriptingFactory> {
    ConnectionAdaptor::new(name, "scripted test backend", schemes, fake_factory(backend))
}
