//! Resumable media upload for load jobs
//!
//! `gcp-bigquery-client` inserts load jobs that read from Cloud Storage only, so
//! a local file goes through the upload endpoint: open a session carrying the
//! job configuration, then send the file bytes to the session URI.

use crate::gbq::error::{GbqError, Result};
use crate::gbq::schema::{LoadOptions, SchemaField, TableReference};
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const UPLOAD_ROOT: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Google API error envelope: `{"error": {"code": .., "message": ..}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Error for a non-success upload response; keeps the body read failure if there was one
fn api_error<E: fmt::Display>(
    status: StatusCode,
    body: std::result::Result<String, E>,
) -> GbqError {
    let message = match body {
        Ok(body) => serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body),
        Err(e) => format!("response body unreadable: {}", e),
    };

    match status {
        StatusCode::UNAUTHORIZED => GbqError::Auth(message),
        _ => GbqError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Configuration of a CSV load job into `destination`
pub(crate) fn load_job_body(
    destination: &TableReference,
    schema: &[SchemaField],
    options: &LoadOptions,
) -> Value {
    let mut load = json!({
        "destinationTable": destination,
        "encoding": options.encoding,
        "sourceFormat": options.source_format,
        "skipLeadingRows": options.skip_leading_rows,
        "createDisposition": options.create_disposition,
        "writeDisposition": options.write_disposition,
    });

    if !schema.is_empty() {
        let fields: Vec<Value> = schema
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "type": f.field_type.as_str(),
                    "mode": f.mode,
                })
            })
            .collect();
        load["schema"] = json!({ "fields": fields });
    }

    json!({ "configuration": { "load": load } })
}

#[derive(Clone)]
pub(crate) struct MediaUploader {
    http: Client,
    key: ServiceAccountKey,
}

impl MediaUploader {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let http = Client::builder()
            .read_timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| GbqError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, key })
    }

    async fn access_token(&self) -> Result<String> {
        let auth = ServiceAccountAuthenticator::builder(self.key.clone())
            .build()
            .await
            .map_err(|e| GbqError::Auth(format!("Failed to build authenticator: {}", e)))?;

        let token = auth
            .token(&[BIGQUERY_SCOPE])
            .await
            .map_err(|e| GbqError::Auth(e.to_string()))?;

        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| GbqError::Auth("Token response had no access token".into()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(api_error(status, response.text().await))
    }

    /// Submit a load job whose data is `bytes`; returns the created job resource
    pub async fn upload(
        &self,
        project_id: &str,
        destination: &TableReference,
        schema: &[SchemaField],
        options: &LoadOptions,
        bytes: Vec<u8>,
    ) -> Result<Job> {
        let token = self.access_token().await?;
        let url = format!("{}/projects/{}/jobs", UPLOAD_ROOT, project_id);
        let body = load_job_body(destination, schema, options);

        let session = self
            .send(
                self.http
                    .post(&url)
                    .bearer_auth(&token)
                    .query(&[("uploadType", "resumable")])
                    .header("X-Upload-Content-Type", "application/octet-stream")
                    .json(&body),
            )
            .await?;

        let session_url = session
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| GbqError::Other("Upload session response missing Location".into()))?;

        debug!(bytes = bytes.len(), table = %destination, "sending upload body");
        let response = self
            .send(
                self.http
                    .put(&session_url)
                    .bearer_auth(&token)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(bytes),
            )
            .await?;

        Ok(response.json().await?)
    }
}
