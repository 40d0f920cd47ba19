mod adaptor;
mod command_executor;
mod job_scheduler;
mod scheduler_dialect;

#[rustfmt::skip]
pub use self::{
    adaptor::Adaptor,
    command_executor::{CommandExecutor, CommandLine, CommandOutput},
    job_scheduler::SchedulerConnection,
    scheduler_dialect::{AccountingRecord, ListingEntry, Queues, SchedulerDialect},
};
