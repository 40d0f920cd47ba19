use serde::*;

/// One `sacct -PX -o JobID,State,ExitCode,End` row.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SacctRecord {
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "ExitCode")]
    pub exit_code: String,
    #[serde(rename = "End")]
    pub end: String,
}

/// One `squeue -h -o %i|%T|%P` row.
#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct SqueueRow {
    pub job_id: String,
    pub state: String,
    pub partition: String,
}

pub(super) fn reader(data: &[u8], headers: bool) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b'|')
        .quoting(false)
        .has_headers(headers)
        .from_reader(data)
}
