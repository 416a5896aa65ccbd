//! Client configuration
//!
//! Settings for the BigQuery client, read from environment variables:
//!
//! | Variable                         | Meaning                               | Default              |
//! |----------------------------------|---------------------------------------|----------------------|
//! | `GBQ_CREDENTIALS`                | Service account key file (JSON)       | required*            |
//! | `GOOGLE_APPLICATION_CREDENTIALS` | Fallback for `GBQ_CREDENTIALS`        | unset                |
//! | `GBQ_PROJECT_ID`                 | Project that owns jobs                | key's `project_id`   |
//! | `GBQ_LOCATION`                   | Job location (e.g. `EU`)              | unset                |
//! | `GBQ_POLL_INTERVAL_MS`           | Delay between job status polls        | 1000                 |
//! | `GBQ_PAGE_SIZE`                  | Rows per `tabledata.list` page        | 10000                |
//!
//! \* one of the two credential variables must be set

use crate::gbq::error::{GbqError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to a service account key file
    pub credentials: PathBuf,

    /// Overrides the `project_id` recorded in the key file
    pub project_id: Option<String>,

    /// Location jobs run in; needed to look up jobs outside US/EU multi-regions
    pub location: Option<String>,

    pub poll_interval: Duration,

    pub page_size: u32,
}

impl ClientConfig {
    pub fn new(credentials: impl Into<PathBuf>) -> Self {
        Self {
            credentials: credentials.into(),
            project_id: None,
            location: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let credentials = non_empty("GBQ_CREDENTIALS")
            .or_else(|| non_empty("GOOGLE_APPLICATION_CREDENTIALS"))
            .ok_or_else(|| {
                GbqError::Config(
                    "GBQ_CREDENTIALS or GOOGLE_APPLICATION_CREDENTIALS must point to a service account key file"
                        .into(),
                )
            })?;

        let mut config = Self::new(credentials);
        config.project_id = non_empty("GBQ_PROJECT_ID");
        config.location = non_empty("GBQ_LOCATION");

        if let Some(ms) = lookup("GBQ_POLL_INTERVAL_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                GbqError::Config(format!("Invalid GBQ_POLL_INTERVAL_MS '{}'", ms))
            })?;
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(size) = lookup("GBQ_PAGE_SIZE") {
            config.page_size = size
                .parse()
                .ok()
                .filter(|n: &u32| *n > 0)
                .ok_or_else(|| GbqError::Config(format!("Invalid GBQ_PAGE_SIZE '{}'", size)))?;
        }

        Ok(config)
    }
}
