use thiserror::Error;

/// Errors that can occur when moving data to and from the warehouse
#[derive(Debug, Error)]
pub enum GbqError {
    /// Error reported by the BigQuery client library
    #[error("BigQuery error: {0}")]
    BigQuery(#[from] gcp_bigquery_client::error::BQError),

    /// HTTP transport error during a file upload
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upload endpoint answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Configuration error (missing env vars, invalid values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file error while staging an upload
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization or DataFrame construction error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Malformed JSON payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A cell did not match its column's declared type
    #[error("Cannot parse {value:?} as {expected} in column '{column}'")]
    Parse {
        column: String,
        value: String,
        expected: &'static str,
    },

    /// A job reached its terminal state with an error
    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// A query job finished without a destination table
    #[error("Job {0} has no destination table")]
    MissingDestination(String),

    /// The referenced table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Type alias for Results using GbqError
pub type Result<T> = std::result::Result<T, GbqError>;
