//! DataFrame transfer operations
//!
//! Flow:
//! - upload: DataFrame → staged CSV → load job → (optional) wait
//! - download: reload table metadata → take at most `limit` rows → DataFrame
//! - query: submit under a fresh job id → wait → download destination table

use super::cell::Row;
use super::client::{RemoteTable, TransferJob, Warehouse};
use super::error::{GbqError, Result};
use super::frame_convert::rows_to_frame;
use super::schema::{LoadOptions, QueryOptions, WriteMode};
use super::staging::StagedCsv;
use futures::{StreamExt, TryStreamExt};
use polars::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

/// Settings for [`upload_with`]
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub write_mode: WriteMode,
    /// Wait for the load job to finish before returning
    pub blocking: bool,
    /// Directory for the staged CSV (system temp dir when `None`)
    pub staging_dir: Option<PathBuf>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::RequireEmpty,
            blocking: true,
            staging_dir: None,
        }
    }
}

/// Upload a DataFrame to a warehouse table
///
/// # Arguments
/// * `df` - Frame to upload; its column names become the CSV header
/// * `table` - Target table handle
/// * `write_mode` - Behaviour when the target already holds rows
/// * `blocking` - Wait for the load job before returning
///
/// # Returns
/// The load job, so a non-blocking caller can wait on it later
pub async fn upload<T: RemoteTable>(
    df: &DataFrame,
    table: &T,
    write_mode: WriteMode,
    blocking: bool,
) -> Result<T::Job> {
    let options = UploadOptions {
        write_mode,
        blocking,
        ..Default::default()
    };
    upload_with(df, table, &options).await
}

/// Upload a DataFrame with explicit [`UploadOptions`]
pub async fn upload_with<T: RemoteTable>(
    df: &DataFrame,
    table: &T,
    options: &UploadOptions,
) -> Result<T::Job> {
    let mut job = {
        let staged = StagedCsv::write(df, options.staging_dir.as_deref())?;
        let file = staged.open_for_read()?;

        let load = LoadOptions::csv(options.write_mode);
        let job = table.upload_from_file(file, &load).await?;

        staged.close();
        job
    };

    info!(
        table = %table.reference(),
        job_id = job.job_id(),
        rows = df.height(),
        write_mode = %options.write_mode,
        "submitted load job"
    );

    if options.blocking {
        job.wait().await?;
        debug!(job_id = job.job_id(), "load job done");
    }

    Ok(job)
}

/// Treat negative limits as "no limit"; limits past `usize::MAX` saturate
pub fn normalize_limit(limit: Option<i64>) -> Option<usize> {
    limit
        .filter(|n| *n >= 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

/// Download a warehouse table into a DataFrame
///
/// Columns come from the reloaded table schema, in declared order. With
/// `limit = Some(0)` the result has no rows but every column, which is handy
/// for schema discovery. `None` or a negative limit fetches all rows.
pub async fn download<T: RemoteTable>(table: &mut T, limit: Option<i64>) -> Result<DataFrame> {
    let limit = normalize_limit(limit);

    table.reload().await?;

    let rows = table.fetch_rows();
    let rows: Vec<Row> = match limit {
        Some(n) => rows.take(n).try_collect().await?,
        None => rows.try_collect().await?,
    };

    debug!(
        table = %table.reference(),
        columns = table.schema().len(),
        rows = rows.len(),
        "fetched rows"
    );

    rows_to_frame(table.schema(), &rows)
}

/// Fresh job id for a query submission
pub fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}

/// Run a single SQL statement and return its result as a DataFrame
///
/// The query runs with standard (non-legacy) SQL under a freshly generated job
/// id. Failures reported by the job are returned from the wait; nothing is retried.
pub async fn query<W: Warehouse>(sql: &str, client: &W) -> Result<DataFrame> {
    let job_id = new_job_id();
    let options = QueryOptions {
        use_legacy_sql: false,
    };

    let mut job = client.run_async_query(&job_id, sql, &options).await?;
    info!(job_id = %job_id, "submitted query job");

    job.wait().await?;

    let destination = job
        .destination()
        .cloned()
        .ok_or_else(|| GbqError::MissingDestination(job.job_id().to_string()))?;

    let mut table = client.table(destination);
    download(&mut table, None).await
}
