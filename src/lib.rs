//! gbq_polars
//!
//! Move Polars DataFrames to and from BigQuery tables: upload a frame, download
//! a table (optionally capped at a row limit), or run a query and download its
//! result.

pub mod config;
pub mod gbq;

pub use gbq::{download, query, upload, upload_with, GbqError, Result, UploadOptions};
