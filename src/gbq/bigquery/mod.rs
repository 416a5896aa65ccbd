//! BigQuery backend
//!
//! Thin adapters over `gcp-bigquery-client`:
//! - `client.rs`: client from a service account key, query job submission
//! - `table.rs`: table metadata and paged `tabledata.list` reads
//! - `job.rs`: job status refresh
//! - `resource.rs`: reading schema, rows and job status out of SDK resources
//! - `upload.rs`: resumable media upload of load job files, which the SDK lacks

mod client;
mod job;
mod resource;
mod table;
mod upload;

pub use client::BigQueryClient;
pub use job::BigQueryJob;
pub use table::BigQueryTable;
