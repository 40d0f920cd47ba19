use std::collections::HashMap;

use chrono::NaiveDateTime;
use domain::{model::entity::JobState, JobsError, Result};

/// One row of the default `qstat` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QstatRow {
    pub job_id: String,
    pub state: String,
    /// Queue instance without the host part, only once the job is scheduled.
    pub queue: Option<String>,
}

impl QstatRow {
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return Err(JobsError::unknown(format!("short qstat line {line:?}")));
        }
        let queue = fields
            .get(7)
            .and_then(|q| q.split_once('@'))
            .map(|(q, _)| q.to_owned());
        Ok(Self {
            job_id: fields[0].to_owned(),
            state: fields[4].to_owned(),
            queue,
        })
    }

    /// `E` states (`Eqw`, `Er`) stay listed until someone clears or deletes
    /// the job, so they count as failed. `qw` and `hqw` wait, everything else
    /// has started.
    pub fn job_state(&self) -> JobState {
        if self.state.contains('E') {
            JobState::Error
        } else if self.state.contains(['r', 't', 's', 'S', 'T']) {
            JobState::Running
        } else {
            JobState::Pending
        }
    }
}

/// `key value` lines of one `qacct -j` record or one `qconf -sq` listing.
/// A trailing backslash continues the value on the next line.
pub fn key_values(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut pending: Option<(String, String)> = None;

    for line in text.lines() {
        if let Some((key, mut value)) = pending.take() {
            let part = line.trim();
            if !value.is_empty() {
                value.push(' ');
            }
            match part.strip_suffix('\\') {
                Some(part) => {
                    value += part.trim_end();
                    pending = Some((key, value));
                }
                None => {
                    value += part;
                    map.insert(key, value);
                }
            }
            continue;
        }

        let line = line.trim_end();
        let Some((key, value)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let value = value.trim();
        match value.strip_suffix('\\') {
            Some(value) => pending = Some((key.to_owned(), value.trim_end().to_owned())),
            None => {
                map.insert(key.to_owned(), value.to_owned());
            }
        }
    }
    if let Some((key, value)) = pending {
        map.insert(key, value);
    }
    map
}

/// The last record of a `qacct -j` answer; restarted jobs have several.
pub fn last_qacct_record(stdout: &str) -> Option<HashMap<String, String>> {
    let mut records = vec![String::new()];
    for line in stdout.lines() {
        if line.starts_with("===") {
            records.push(String::new());
        } else if let Some(current) = records.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    records
        .iter()
        .rev()
        .map(|text| key_values(text))
        .find(|record| !record.is_empty())
}

/// `Mon Oct 19 10:00:10 2026` or, from SGE 8.1.9 on, `10/19/2026 10:00:10.123`.
pub fn parse_end_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%m/%d/%Y %H:%M:%S%.f"))
        .ok()
}
