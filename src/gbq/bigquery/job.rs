use super::client::BigQueryClient;
use super::resource::{summarize_job, JobSummary};
use crate::gbq::client::{poll_until_done, JobState, TransferJob, Warehouse};
use crate::gbq::error::Result;
use crate::gbq::schema::TableReference;
use gcp_bigquery_client::model::job::Job;
use tracing::debug;

/// Handle to a BigQuery load or query job
pub struct BigQueryJob {
    client: BigQueryClient,
    job_id: String,
    location: Option<String>,
    state: JobState,
    destination: Option<TableReference>,
}

impl BigQueryJob {
    pub(crate) fn from_job(client: BigQueryClient, job: &Job) -> Result<Self> {
        let JobSummary {
            job_id,
            location,
            state,
            destination,
        } = summarize_job(job)?;

        Ok(BigQueryJob {
            location: location.or_else(|| client.config().location.clone()),
            job_id,
            state,
            destination,
            client,
        })
    }
}

impl TransferJob for BigQueryJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn state(&self) -> &JobState {
        &self.state
    }

    fn destination(&self) -> Option<&TableReference> {
        self.destination.as_ref()
    }

    async fn refresh(&mut self) -> Result<JobState> {
        let job = self
            .client
            .sdk()
            .job()
            .get_job(
                self.client.project_id(),
                &self.job_id,
                self.location.as_deref(),
            )
            .await?;
        let summary = summarize_job(&job)?;

        if summary.state != self.state {
            debug!(
                job_id = %self.job_id,
                from = ?self.state,
                to = ?summary.state,
                "job state changed"
            );
        }

        self.state = summary.state.clone();
        if summary.destination.is_some() {
            self.destination = summary.destination;
        }
        Ok(summary.state)
    }

    async fn wait(&mut self) -> Result<()> {
        let interval = self.client.config().poll_interval;
        poll_until_done(self, interval).await
    }
}
