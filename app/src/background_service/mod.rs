mod refresh_jobs;

pub mod prelude {
    #[rustfmt::skip]
    pub use super::{
        refresh_jobs::refresh_jobs,
    };
}
