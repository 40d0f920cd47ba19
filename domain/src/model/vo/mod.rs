pub mod job;
pub mod status;

#[rustfmt::skip]
pub use self::{
    job::JobDescription,
    status::{JobStatus, QueueStatus},
};
