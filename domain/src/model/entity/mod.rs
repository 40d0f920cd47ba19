pub mod job;
pub mod scheduler;

#[rustfmt::skip]
pub use self::{
    job::{Job, JobState},
    scheduler::{Credential, Scheduler},
};
