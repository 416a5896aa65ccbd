use super::job::BigQueryJob;
use super::table::BigQueryTable;
use super::upload::MediaUploader;
use crate::config::ClientConfig;
use crate::gbq::client::Warehouse;
use crate::gbq::error::{GbqError, Result};
use crate::gbq::schema::{QueryOptions, SchemaField, TableReference};
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::yup_oauth2::read_service_account_key;
use gcp_bigquery_client::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// BigQuery client authenticated with a service account key
#[derive(Clone)]
pub struct BigQueryClient {
    sdk: Client,
    uploader: MediaUploader,
    project_id: String,
    config: Arc<ClientConfig>,
}

impl BigQueryClient {
    /// Create a client from a service account key file
    ///
    /// The project is `config.project_id` when set, otherwise the key's own
    /// `project_id`.
    pub async fn from_service_account_file(config: ClientConfig) -> Result<Self> {
        let key = read_service_account_key(&config.credentials)
            .await
            .map_err(|e| {
                GbqError::Auth(format!(
                    "Failed to read service account key {}: {}",
                    config.credentials.display(),
                    e
                ))
            })?;

        let project_id = config
            .project_id
            .clone()
            .or_else(|| key.project_id.clone())
            .ok_or_else(|| {
                GbqError::Config(
                    "No project id: set GBQ_PROJECT_ID or use a key with a project_id".into(),
                )
            })?;

        let sdk = ClientBuilder::new()
            .build_from_service_account_key(key.clone(), false)
            .await?;

        info!(project_id = %project_id, "BigQuery client ready");

        Ok(BigQueryClient {
            sdk,
            uploader: MediaUploader::new(key)?,
            project_id,
            config: Arc::new(config),
        })
    }

    /// Create a client from environment variables (see [`ClientConfig::from_env`])
    pub async fn from_env() -> Result<Self> {
        Self::from_service_account_file(ClientConfig::from_env()?).await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn sdk(&self) -> &Client {
        &self.sdk
    }

    pub(crate) fn uploader(&self) -> &MediaUploader {
        &self.uploader
    }
}

/// Query job submitted under a caller-chosen job id
fn query_job(
    project_id: &str,
    job_id: &str,
    location: Option<&str>,
    sql: &str,
    options: &QueryOptions,
) -> Value {
    let mut job_reference = json!({
        "projectId": project_id,
        "jobId": job_id,
    });
    if let Some(location) = location {
        job_reference["location"] = json!(location);
    }

    json!({
        "jobReference": job_reference,
        "configuration": {
            "query": {
                "query": sql,
                "useLegacySql": options.use_legacy_sql,
            }
        }
    })
}

impl Warehouse for BigQueryClient {
    type Job = BigQueryJob;
    type Table = BigQueryTable;

    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn table(&self, reference: TableReference) -> BigQueryTable {
        BigQueryTable::new(self.clone(), reference, Vec::new())
    }

    fn table_with_schema(
        &self,
        reference: TableReference,
        schema: Vec<SchemaField>,
    ) -> BigQueryTable {
        BigQueryTable::new(self.clone(), reference, schema)
    }

    async fn run_async_query(
        &self,
        job_id: &str,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<BigQueryJob> {
        let job: Job = serde_json::from_value(query_job(
            &self.project_id,
            job_id,
            self.config.location.as_deref(),
            sql,
            options,
        ))?;

        debug!(job_id, "inserting query job");
        let inserted = self.sdk.job().insert(&self.project_id, job).await?;
        BigQueryJob::from_job(self.clone(), &inserted)
    }
}
