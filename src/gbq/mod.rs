//! Warehouse transfer module
//!
//! Structure:
//! - `transfer.rs`: upload / download / query operations
//! - `client.rs`: collaborator traits implemented by backends
//! - `bigquery/`: BigQuery backend over `gcp-bigquery-client`
//! - `memory/`: in-process backend (tests, local development)
//! - `staging.rs`: scoped temporary CSV for uploads
//! - `frame_convert.rs`: rows <-> DataFrame
//! - `schema.rs`, `cell.rs`: table references, schema fields, cell values
//! - `error.rs`: Error types

pub mod bigquery;
pub mod cell;
pub mod client;
pub mod error;
pub mod frame_convert;
pub mod memory;
pub mod schema;
pub mod staging;
pub mod transfer;

pub use cell::{Cell, Row};
pub use client::{poll_until_done, JobState, RemoteTable, TransferJob, Warehouse};
pub use error::{GbqError, Result};
pub use memory::{MemoryJob, MemoryTable, MemoryWarehouse};
pub use bigquery::{BigQueryClient, BigQueryJob, BigQueryTable};
pub use schema::{
    CreateMode, FieldMode, FieldType, LoadOptions, QueryOptions, SchemaField, TableReference,
    WriteMode,
};
pub use transfer::{download, query, upload, upload_with, UploadOptions};
