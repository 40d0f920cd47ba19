pub mod gridengine;
pub mod slurm;

use std::collections::BTreeMap;

use domain::{model::vo::JobDescription, JobsError, Result};

use crate::infrastructure::command::quote;

/// Name every rendered job script carries.
pub const JOB_NAME: &str = "jobs-agent";

/// `minutes` as `HH:MM:00`.
pub fn wall_time(minutes: u32) -> String {
    format!("{:02}:{:02}:00", minutes / 60, minutes % 60)
}

/// Fails on job options this backend does not know.
pub fn check_options(description: &JobDescription, known: &[&str]) -> Result<()> {
    match description.job_options.keys().find(|k| !known.contains(&k.as_str())) {
        Some(key) => Err(JobsError::invalid_description(format!("unknown job option {key:?}"))),
        None => Ok(()),
    }
}

/// `export` lines in a stable order.
pub fn exports(description: &JobDescription) -> String {
    let sorted: BTreeMap<_, _> = description.environment.iter().collect();
    sorted
        .into_iter()
        .map(|(k, v)| format!("export {k}={}\n", quote(v)))
        .collect()
}

/// The executable and its arguments, shell quoted.
pub fn invocation(description: &JobDescription) -> String {
    let mut line = quote(&description.executable).into_owned();
    for arg in &description.arguments {
        line.push(' ');
        line += &quote(arg);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers() {
        assert_eq!(wall_time(0), "00:00:00");
        assert_eq!(wall_time(90), "01:30:00");
        assert_eq!(wall_time(6000), "100:00:00");

        let description = JobDescription::builder()
            .executable("/bin/echo")
            .arguments(vec!["a b".to_owned(), "c".to_owned()])
            .environment([("B".to_owned(), "2".to_owned()), ("A".to_owned(), "x y".to_owned())].into())
            .job_options([("mystery".to_owned(), "1".to_owned())].into())
            .build();
        assert_eq!(invocation(&description), "/bin/echo 'a b' c");
        assert_eq!(exports(&description), "export A='x y'\nexport B=2\n");
        assert!(check_options(&description, &["known"]).is_err());
        assert!(check_options(&description, &["mystery"]).is_ok());
    }
}
