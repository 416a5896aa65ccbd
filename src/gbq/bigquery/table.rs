use super::client::BigQueryClient;
use super::job::BigQueryJob;
use super::resource::{decode_row, table_metadata};
use crate::gbq::cell::Row;
use crate::gbq::client::{RemoteTable, Warehouse};
use crate::gbq::error::{GbqError, Result};
use crate::gbq::schema::{LoadOptions, SchemaField, TableReference};
use futures::stream::{self, BoxStream};
use futures::{Future, StreamExt, TryStreamExt};
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::tabledata::ListQueryParameters;
use std::io::Read;
use tracing::debug;

/// One page of rows plus the token of the next page, if any
pub(crate) type Page = (Vec<Row>, Option<String>);

/// Flatten a token-paged listing into a row stream
///
/// Pages are requested only as the stream is polled. The listing ends after a
/// page that carries no token (or an empty one).
pub(crate) fn paged_rows<'a, F, Fut>(fetch_page: F) -> BoxStream<'a, Result<Row>>
where
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page>> + Send + 'a,
{
    // Cursor: None once the last page was served, otherwise the next page's token
    stream::try_unfold(
        (fetch_page, Some(None)),
        |(fetch_page, cursor): (F, Option<Option<String>>)| async move {
            let Some(token) = cursor else {
                return Ok::<_, GbqError>(None);
            };

            let (rows, next) = fetch_page(token).await?;
            let next = next.filter(|t| !t.is_empty()).map(Some);
            Ok(Some((rows, (fetch_page, next))))
        },
    )
    .map_ok(|rows| stream::iter(rows.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}

/// Handle to a BigQuery table
pub struct BigQueryTable {
    client: BigQueryClient,
    reference: TableReference,
    schema: Vec<SchemaField>,
    num_rows: Option<u64>,
}

impl BigQueryTable {
    pub fn new(
        client: BigQueryClient,
        reference: TableReference,
        schema: Vec<SchemaField>,
    ) -> Self {
        BigQueryTable {
            client,
            reference,
            schema,
            num_rows: None,
        }
    }

    async fn fetch_page(&self, page_token: Option<String>) -> Result<Page> {
        let params = ListQueryParameters {
            start_index: None,
            max_results: Some(self.client.config().page_size),
            page_token,
            selected_fields: None,
            format_options: None,
        };

        let page = self
            .client
            .sdk()
            .tabledata()
            .list(
                &self.reference.project_id,
                &self.reference.dataset_id,
                &self.reference.table_id,
                params,
            )
            .await?;

        let rows = page
            .rows
            .unwrap_or_default()
            .iter()
            .map(|row| decode_row(&self.schema, row))
            .collect::<Result<Vec<Row>>>()?;

        Ok((rows, page.page_token))
    }
}

impl RemoteTable for BigQueryTable {
    type Job = BigQueryJob;

    fn reference(&self) -> &TableReference {
        &self.reference
    }

    fn schema(&self) -> &[SchemaField] {
        &self.schema
    }

    fn num_rows(&self) -> Option<u64> {
        self.num_rows
    }

    async fn reload(&mut self) -> Result<()> {
        let result = self
            .client
            .sdk()
            .table()
            .get(
                &self.reference.project_id,
                &self.reference.dataset_id,
                &self.reference.table_id,
                None,
            )
            .await;

        let table = match result {
            Err(BQError::ResponseError { error }) if error.error.code == 404 => {
                return Err(GbqError::TableNotFound(self.reference.to_string()))
            }
            other => other?,
        };

        let (schema, num_rows) = table_metadata(&table)?;
        self.schema = schema;
        self.num_rows = num_rows;
        debug!(
            table = %self.reference,
            columns = self.schema.len(),
            rows = ?self.num_rows,
            "reloaded table metadata"
        );
        Ok(())
    }

    fn fetch_rows(&self) -> BoxStream<'_, Result<Row>> {
        paged_rows(move |token| self.fetch_page(token))
    }

    async fn upload_from_file(
        &self,
        mut file: std::fs::File,
        options: &LoadOptions,
    ) -> Result<Self::Job> {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let job = self
            .client
            .uploader()
            .upload(
                self.client.project_id(),
                &self.reference,
                &self.schema,
                options,
                bytes,
            )
            .await?;

        BigQueryJob::from_job(self.client.clone(), &job)
    }
}
