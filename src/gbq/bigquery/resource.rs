//! Fields read out of SDK resources
//!
//! Job and table resources are inspected through their JSON form, which is the
//! documented REST shape, so only the handful of fields used here are touched.

use crate::gbq::cell::{Cell, Row};
use crate::gbq::client::JobState;
use crate::gbq::error::{GbqError, Result};
use crate::gbq::schema::{SchemaField, TableReference};
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::table::Table;
use gcp_bigquery_client::model::table_row::TableRow;
use serde_json::Value;

/// What a job resource says about the job
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JobSummary {
    pub job_id: String,
    pub location: Option<String>,
    pub state: JobState,
    pub destination: Option<TableReference>,
}

pub(crate) fn summarize_job(job: &Job) -> Result<JobSummary> {
    summarize_job_view(&serde_json::to_value(job)?)
}

fn text(view: &Value, path: &str) -> Option<String> {
    view.pointer(path).and_then(Value::as_str).map(str::to_string)
}

fn describe_error(error: &Value) -> String {
    match (text(error, "/reason"), text(error, "/message")) {
        (Some(reason), Some(message)) => format!("{}: {}", reason, message),
        (None, Some(message)) => message,
        (Some(reason), None) => reason,
        (None, None) => "unknown error".to_string(),
    }
}

fn summarize_job_view(view: &Value) -> Result<JobSummary> {
    let job_id = text(view, "/jobReference/jobId")
        .ok_or_else(|| GbqError::Other("Job resource has no job id".into()))?;

    let state = match text(view, "/status/state").as_deref() {
        Some("DONE") => match view.pointer("/status/errorResult") {
            Some(error) if !error.is_null() => JobState::Failed(describe_error(error)),
            _ => JobState::Done,
        },
        Some("RUNNING") => JobState::Running,
        _ => JobState::Pending,
    };

    let destination = view
        .pointer("/configuration/query/destinationTable")
        .filter(|v| !v.is_null())
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()?;

    Ok(JobSummary {
        job_id,
        location: text(view, "/jobReference/location"),
        state,
        destination,
    })
}

/// Schema and row count of a `tables.get` resource
pub(crate) fn table_metadata(table: &Table) -> Result<(Vec<SchemaField>, Option<u64>)> {
    table_metadata_view(&serde_json::to_value(table)?)
}

fn table_metadata_view(view: &Value) -> Result<(Vec<SchemaField>, Option<u64>)> {
    let schema = match view.pointer("/schema/fields") {
        Some(fields) if !fields.is_null() => serde_json::from_value(fields.clone())?,
        _ => Vec::new(),
    };

    // int64 values travel as JSON strings
    let num_rows = match view.get("numRows") {
        Some(Value::String(n)) => n.parse().ok(),
        Some(n) => n.as_u64(),
        None => None,
    };

    Ok((schema, num_rows))
}

/// Type each cell of a `tabledata.list` row by its schema field
pub(crate) fn decode_row(schema: &[SchemaField], row: &TableRow) -> Result<Row> {
    let cells = row.columns.as_deref().unwrap_or_default();

    schema
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let text = match cells.get(idx).and_then(|c| c.value.as_ref()) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            Cell::parse(field, text.as_deref())
        })
        .collect()
}
