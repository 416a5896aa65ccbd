//! Collaborator interfaces implemented by warehouse backends
//!
//! The transfer operations only talk to a warehouse through these traits, so a
//! BigQuery-backed client and the in-memory warehouse used in tests are
//! interchangeable.
//!
//! Implementations:
//! - `bigquery::BigQueryClient`: BigQuery through `gcp-bigquery-client`
//! - `memory::MemoryWarehouse`: in-process catalog, queries run by Polars SQL

#![allow(async_fn_in_trait)]

use super::cell::Row;
use super::error::{GbqError, Result};
use super::schema::{LoadOptions, QueryOptions, SchemaField, TableReference};
use futures::stream::BoxStream;
use std::time::Duration;
use tracing::debug;

/// Lifecycle of an asynchronous warehouse job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed(_))
    }
}

/// Handle to an upload or query job owned by the warehouse
pub trait TransferJob {
    fn job_id(&self) -> &str;

    /// Last observed state; call `refresh` or `wait` to update it
    fn state(&self) -> &JobState;

    /// Destination table of a finished query job
    fn destination(&self) -> Option<&TableReference>;

    /// Poll the warehouse once for the current state
    async fn refresh(&mut self) -> Result<JobState>;

    /// Block until the job is terminal; a failed job is returned as `GbqError::JobFailed`
    async fn wait(&mut self) -> Result<()>;
}

/// Refresh `job` every `interval` until it is terminal
///
/// A job that ends in `Failed` is returned as `GbqError::JobFailed`.
pub async fn poll_until_done<J: TransferJob>(job: &mut J, interval: Duration) -> Result<()> {
    let mut polls = 0usize;
    while !job.state().is_terminal() {
        tokio::time::sleep(interval).await;
        job.refresh().await?;
        polls += 1;
    }
    debug!(job_id = job.job_id(), polls, "job reached terminal state");

    match job.state() {
        JobState::Failed(reason) => Err(GbqError::JobFailed {
            job_id: job.job_id().to_string(),
            reason: reason.clone(),
        }),
        _ => Ok(()),
    }
}

/// Handle to a warehouse table
pub trait RemoteTable {
    type Job: TransferJob;

    fn reference(&self) -> &TableReference;

    /// Declared schema, in column order, as of the last `reload`
    fn schema(&self) -> &[SchemaField];

    /// Row count as of the last `reload`
    fn num_rows(&self) -> Option<u64>;

    /// Refresh schema and row count from the warehouse
    async fn reload(&mut self) -> Result<()>;

    /// Lazily fetch rows page by page; pages are only requested as the stream is polled
    fn fetch_rows(&self) -> BoxStream<'_, Result<Row>>;

    /// Submit a load job reading the given binary file
    async fn upload_from_file(
        &self,
        file: std::fs::File,
        options: &LoadOptions,
    ) -> Result<Self::Job>;
}

/// Entry point of a warehouse backend
pub trait Warehouse {
    type Job: TransferJob;
    type Table: RemoteTable<Job = Self::Job>;

    fn project_id(&self) -> &str;

    /// Handle for an existing table; its schema is filled in by `reload`
    fn table(&self, reference: TableReference) -> Self::Table;

    /// Handle carrying a schema, used when an upload may create the table
    fn table_with_schema(&self, reference: TableReference, schema: Vec<SchemaField>)
        -> Self::Table;

    /// Handle for `dataset.table` in the client's own project
    fn dataset_table(&self, dataset_id: &str, table_id: &str) -> Self::Table {
        self.table(TableReference::new(self.project_id(), dataset_id, table_id))
    }

    /// Submit a query job under the caller-chosen id without waiting for it
    async fn run_async_query(
        &self,
        job_id: &str,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<Self::Job>;
}
