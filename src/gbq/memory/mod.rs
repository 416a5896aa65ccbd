//! In-memory warehouse
//!
//! Stores tables as typed rows behind a shared catalog and implements the same
//! collaborator traits as the BigQuery client. Load jobs parse the staged CSV the
//! way the warehouse does (header skipped, columns matched to the schema by
//! position, text parsed by declared type). Query jobs run through Polars SQL.
//!
//! Job outcomes are decided at submission; `wait()` then reports them.

mod names;

use super::cell::{Cell, Row};
use super::client::{poll_until_done, JobState, RemoteTable, TransferJob, Warehouse};
use super::error::{GbqError, Result};
use super::frame_convert::{frame_to_rows, rows_to_frame};
use super::schema::{
    CreateMode, FieldMode, LoadOptions, QueryOptions, SchemaField, TableReference, WriteMode,
};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use polars::prelude::*;
use polars::sql::SQLContext;
use names::{flat_name, rewrite_qualified_names};
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Dataset holding anonymous query results
pub const RESULTS_DATASET: &str = "_memory_results";

const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Most recent job ids kept for duplicate detection
pub const JOB_HISTORY: usize = 4_096;

#[derive(Debug, Clone, Default)]
struct StoredTable {
    schema: Vec<SchemaField>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct Catalog {
    tables: HashMap<TableReference, StoredTable>,
    job_ids: VecDeque<String>,
}

/// Cloneable handle to a shared in-memory catalog
#[derive(Clone)]
pub struct MemoryWarehouse {
    project_id: String,
    catalog: Arc<Mutex<Catalog>>,
    page_size: usize,
    page_requests: Arc<AtomicUsize>,
}

impl MemoryWarehouse {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            catalog: Arc::new(Mutex::new(Catalog::default())),
            page_size: DEFAULT_PAGE_SIZE,
            page_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Rows returned per page by `fetch_rows`
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn catalog(&self) -> Result<MutexGuard<'_, Catalog>> {
        self.catalog
            .lock()
            .map_err(|_| GbqError::Other("memory catalog lock poisoned".into()))
    }

    /// Create (or replace) a table with the given schema and rows
    pub fn create_table(
        &self,
        reference: TableReference,
        schema: Vec<SchemaField>,
        rows: Vec<Row>,
    ) -> Result<()> {
        self.catalog()?
            .tables
            .insert(reference, StoredTable { schema, rows });
        Ok(())
    }

    /// Create (or replace) a table from a DataFrame, inferring its schema
    pub fn insert_frame(&self, reference: TableReference, df: &DataFrame) -> Result<()> {
        let (schema, rows) = frame_to_rows(df)?;
        self.create_table(reference, schema, rows)
    }

    /// Stored rows of a table, if it exists
    pub fn rows(&self, reference: &TableReference) -> Result<Option<Vec<Row>>> {
        Ok(self.catalog()?.tables.get(reference).map(|t| t.rows.clone()))
    }

    /// Ids of the last [`JOB_HISTORY`] jobs, in submission order
    pub fn job_ids(&self) -> Result<Vec<String>> {
        Ok(self.catalog()?.job_ids.iter().cloned().collect())
    }

    /// Number of row pages served to `fetch_rows` streams
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    fn register_job(&self, catalog: &mut Catalog, job_id: &str) -> Result<()> {
        if catalog.job_ids.iter().any(|id| id == job_id) {
            return Err(GbqError::Api {
                status: 409,
                message: format!("Already Exists: Job {}:{}", self.project_id, job_id),
            });
        }
        catalog.job_ids.push_back(job_id.to_string());
        if catalog.job_ids.len() > JOB_HISTORY {
            catalog.job_ids.pop_front();
        }
        Ok(())
    }

    fn read_page(&self, reference: &TableReference, offset: usize) -> Result<Vec<Row>> {
        let catalog = self.catalog()?;
        let table = catalog
            .tables
            .get(reference)
            .ok_or_else(|| GbqError::TableNotFound(reference.to_string()))?;

        self.page_requests.fetch_add(1, Ordering::SeqCst);

        let end = (offset + self.page_size).min(table.rows.len());
        Ok(table.rows.get(offset..end).unwrap_or_default().to_vec())
    }

    fn load_csv(
        &self,
        reference: &TableReference,
        declared_schema: &[SchemaField],
        bytes: Vec<u8>,
        options: &LoadOptions,
    ) -> std::result::Result<usize, String> {
        // Every column is read as text and typed against the target schema below
        let frame = CsvReadOptions::default()
            .with_has_header(options.skip_leading_rows > 0)
            .with_skip_rows(options.skip_leading_rows.saturating_sub(1) as usize)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| format!("Error while reading data: {}", e))?;

        let mut catalog = self.catalog().map_err(|e| e.to_string())?;

        // A failed load leaves the catalog untouched: every row parses before anything is written
        let schema = match catalog.tables.get(reference) {
            Some(table) => table.schema.clone(),
            None if options.create_disposition == CreateMode::CreateNever => {
                return Err(format!("Not found: Table {}", reference));
            }
            None if declared_schema.is_empty() => {
                return Err("No schema specified on job or table".to_string());
            }
            None => declared_schema.to_vec(),
        };

        let rows = typed_rows(&frame, &schema)?;
        let loaded = rows.len();

        match catalog.tables.get_mut(reference) {
            Some(table) => match options.write_disposition {
                WriteMode::RequireEmpty if !table.rows.is_empty() => {
                    return Err(format!("Already Exists: Table {}", reference));
                }
                WriteMode::RequireEmpty | WriteMode::Truncate => table.rows = rows,
                WriteMode::Append => table.rows.extend(rows),
            },
            None => {
                catalog
                    .tables
                    .insert(reference.clone(), StoredTable { schema, rows });
            }
        }

        Ok(loaded)
    }

    fn run_sql(&self, job_id: &str, sql: &str) -> std::result::Result<TableReference, String> {
        let mut ctx = SQLContext::new();

        let results = {
            let catalog = self.catalog().map_err(|e| e.to_string())?;
            let queryable: Vec<(&TableReference, &StoredTable)> = catalog
                .tables
                .iter()
                .filter(|(reference, _)| reference.dataset_id != RESULTS_DATASET)
                .collect();

            let rewritten = rewrite_qualified_names(sql, |parts| {
                let reference = match parts {
                    [dataset, table] => {
                        TableReference::new(self.project_id.as_str(), *dataset, *table)
                    }
                    [project, dataset, table] => TableReference::new(*project, *dataset, *table),
                    _ => return None,
                };
                queryable
                    .iter()
                    .any(|(r, _)| **r == reference)
                    .then(|| qualified_name(&reference))
            });

            // Only tables the statement names are materialized
            for (reference, table) in &queryable {
                let qualified = qualified_name(reference);
                let bare = &reference.table_id;
                let by_bare = rewritten.identifiers.contains(bare);
                if !by_bare && !rewritten.identifiers.contains(&qualified) {
                    continue;
                }

                let frame =
                    rows_to_frame(&table.schema, &table.rows).map_err(|e| e.to_string())?;
                if by_bare {
                    let owners = queryable.iter().filter(|(r, _)| &r.table_id == bare).count();
                    if owners > 1 {
                        return Err(format!(
                            "Table name {} is ambiguous; qualify it with its dataset",
                            bare
                        ));
                    }
                    ctx.register(bare, frame.clone().lazy());
                }
                ctx.register(&qualified, frame.lazy());
            }

            let statement = rewritten.sql.trim().trim_end_matches(';').to_string();
            ctx.execute(&statement)
                .and_then(|lf| lf.collect())
                .map_err(|e| format!("Syntax error: {}", e))?
        };

        let (schema, rows) = frame_to_rows(&results).map_err(|e| e.to_string())?;
        let destination = TableReference::new(
            self.project_id.clone(),
            RESULTS_DATASET,
            format!("anon_{}", job_id.replace('-', "_")),
        );

        self.create_table(destination.clone(), schema, rows)
            .map_err(|e| e.to_string())?;

        Ok(destination)
    }
}

fn qualified_name(reference: &TableReference) -> String {
    flat_name(&[
        reference.project_id.as_str(),
        reference.dataset_id.as_str(),
        reference.table_id.as_str(),
    ])
}

/// Parse an all-text frame into rows typed by `schema`, matching columns by position
fn typed_rows(frame: &DataFrame, schema: &[SchemaField]) -> std::result::Result<Vec<Row>, String> {
    if frame.width() != schema.len() {
        return Err(format!(
            "CSV has {} columns but the table schema has {}",
            frame.width(),
            schema.len()
        ));
    }

    let mut text_columns = Vec::with_capacity(schema.len());
    for col in frame.get_columns() {
        let values: Vec<Option<String>> = col
            .as_materialized_series()
            .str()
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(|opt| opt.map(str::to_string))
            .collect();
        text_columns.push(values);
    }

    (0..frame.height())
        .map(|i| {
            schema
                .iter()
                .zip(&text_columns)
                .map(|(field, values)| {
                    let cell =
                        Cell::parse(field, values[i].as_deref()).map_err(|e| e.to_string())?;
                    if cell.is_null() && field.mode == FieldMode::Required {
                        return Err(format!("Required field {} cannot be null", field.name));
                    }
                    Ok(cell)
                })
                .collect::<std::result::Result<Row, String>>()
        })
        .collect()
}

/// Job whose outcome was settled at submission
#[derive(Debug, Clone)]
pub struct MemoryJob {
    job_id: String,
    state: JobState,
    destination: Option<TableReference>,
}

impl MemoryJob {
    pub fn settled(
        job_id: impl Into<String>,
        outcome: std::result::Result<Option<TableReference>, String>,
    ) -> Self {
        let (state, destination) = match outcome {
            Ok(destination) => (JobState::Done, destination),
            Err(reason) => (JobState::Failed(reason), None),
        };
        Self {
            job_id: job_id.into(),
            state,
            destination,
        }
    }
}

impl TransferJob for MemoryJob {
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
        Ok(self.state.clone())
    }

    async fn wait(&mut self) -> Result<()> {
        poll_until_done(self, std::time::Duration::ZERO).await
    }
}

/// Table handle bound to a [`MemoryWarehouse`]
pub struct MemoryTable {
    warehouse: MemoryWarehouse,
    reference: TableReference,
    schema: Vec<SchemaField>,
    num_rows: Option<u64>,
}

impl RemoteTable for MemoryTable {
    type Job = MemoryJob;

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
        let catalog = self.warehouse.catalog()?;
        let table = catalog
            .tables
            .get(&self.reference)
            .ok_or_else(|| GbqError::TableNotFound(self.reference.to_string()))?;

        self.schema = table.schema.clone();
        self.num_rows = Some(table.rows.len() as u64);
        Ok(())
    }

    fn fetch_rows(&self) -> BoxStream<'_, Result<Row>> {
        stream::try_unfold(0usize, move |offset| async move {
            let page = self.warehouse.read_page(&self.reference, offset)?;
            let next = offset + page.len();
            Ok::<_, GbqError>((!page.is_empty()).then_some((page, next)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn upload_from_file(
        &self,
        mut file: std::fs::File,
        options: &LoadOptions,
    ) -> Result<Self::Job> {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let job_id = format!("load_{}", uuid::Uuid::new_v4().simple());
        {
            let mut catalog = self.warehouse.catalog()?;
            self.warehouse.register_job(&mut catalog, &job_id)?;
        }

        let outcome = self
            .warehouse
            .load_csv(&self.reference, &self.schema, bytes, options)
            .map(|loaded| {
                debug!(job_id = %job_id, rows = loaded, "memory load finished");
                None
            });

        Ok(MemoryJob::settled(job_id, outcome))
    }
}

impl Warehouse for MemoryWarehouse {
    type Job = MemoryJob;
    type Table = MemoryTable;

    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn table(&self, reference: TableReference) -> MemoryTable {
        self.table_with_schema(reference, Vec::new())
    }

    fn table_with_schema(
        &self,
        reference: TableReference,
        schema: Vec<SchemaField>,
    ) -> MemoryTable {
        MemoryTable {
            warehouse: self.clone(),
            reference,
            schema,
            num_rows: None,
        }
    }

    async fn run_async_query(
        &self,
        job_id: &str,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<MemoryJob> {
        {
            let mut catalog = self.catalog()?;
            self.register_job(&mut catalog, job_id)?;
        }

        let outcome = if options.use_legacy_sql {
            Err("Legacy SQL is not supported by the memory warehouse".to_string())
        } else {
            self.run_sql(job_id, sql).map(Some)
        };

        Ok(MemoryJob::settled(job_id, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbq::schema::FieldType;

    fn reference(table: &str) -> TableReference {
        TableReference::new("proj", "ds", table)
    }

    fn numbers_schema() -> Vec<SchemaField> {
        vec![
            SchemaField::new("n", FieldType::Integer).required(),
            SchemaField::new("label", FieldType::String),
        ]
    }

    fn load(warehouse: &MemoryWarehouse, table: &str, csv: &str, mode: WriteMode) -> MemoryJob {
        let schema = numbers_schema();
        let bytes = csv.as_bytes().to_vec();
        let outcome = warehouse
            .load_csv(&reference(table), &schema, bytes, &LoadOptions::csv(mode))
            .map(|_| None);
        MemoryJob::settled("job", outcome)
    }

    #[test]
    fn test_load_creates_table_from_declared_schema() {
        let warehouse = MemoryWarehouse::new("proj");
        let job = load(&warehouse, "t", "n,label\n1,a\n2,\n", WriteMode::RequireEmpty);

        assert_eq!(job.state(), &JobState::Done);
        let rows = warehouse.rows(&reference("t")).unwrap().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Cell::Int(1), Cell::Str("a".into())],
                vec![Cell::Int(2), Cell::Null],
            ]
        );
    }

    #[test]
    fn test_load_rejects_null_in_required_field() {
        let warehouse = MemoryWarehouse::new("proj");
        let job = load(&warehouse, "t", "n,label\n,a\n", WriteMode::RequireEmpty);
        assert!(matches!(job.state(), JobState::Failed(reason) if reason.contains("Required")));
    }

    #[test]
    fn test_load_rejects_column_count_mismatch() {
        let warehouse = MemoryWarehouse::new("proj");
        let job = load(&warehouse, "t", "n\n1\n", WriteMode::RequireEmpty);
        assert!(matches!(job.state(), JobState::Failed(_)));
    }

    #[test]
    fn test_duplicate_job_id_is_rejected() {
        let warehouse = MemoryWarehouse::new("proj");
        let mut catalog = warehouse.catalog().unwrap();
        warehouse.register_job(&mut catalog, "same").unwrap();
        let err = warehouse.register_job(&mut catalog, "same").unwrap_err();
        assert!(matches!(err, GbqError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_fetch_rows_pages_lazily() {
        let warehouse = MemoryWarehouse::new("proj").with_page_size(2);
        let rows = (0..5)
            .map(|n| vec![Cell::Int(n), Cell::Str(format!("r{}", n))])
            .collect();
        warehouse
            .create_table(reference("t"), numbers_schema(), rows)
            .unwrap();

        let table = warehouse.table(reference("t"));
        let first: Vec<Row> = table.fetch_rows().take(3).try_collect().await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(warehouse.page_requests(), 2);

        let all: Vec<Row> = table.fetch_rows().try_collect().await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_reload_missing_table_is_not_found() {
        let warehouse = MemoryWarehouse::new("proj");
        let mut table = warehouse.table(reference("missing"));
        let err = table.reload().await.unwrap_err();
        assert!(matches!(err, GbqError::TableNotFound(_)));
    }

    #[test]
    fn test_failed_load_does_not_create_table() {
        let warehouse = MemoryWarehouse::new("proj");
        let job = load(&warehouse, "t", "n,label\nnotanint,a\n", WriteMode::RequireEmpty);

        assert!(matches!(job.state(), JobState::Failed(_)));
        assert!(warehouse.rows(&reference("t")).unwrap().is_none());
    }

    #[test]
    fn test_failed_load_keeps_existing_rows() {
        let warehouse = MemoryWarehouse::new("proj");
        load(&warehouse, "t", "n,label\n1,a\n", WriteMode::RequireEmpty);
        let job = load(&warehouse, "t", "n,label\n2,b\nbad,c\n", WriteMode::Truncate);

        assert!(matches!(job.state(), JobState::Failed(_)));
        let rows = warehouse.rows(&reference("t")).unwrap().unwrap();
        assert_eq!(rows, vec![vec![Cell::Int(1), Cell::Str("a".into())]]);
    }

    #[test]
    fn test_job_history_is_bounded() {
        let warehouse = MemoryWarehouse::new("proj");
        let mut catalog = warehouse.catalog().unwrap();
        for i in 0..=JOB_HISTORY {
            warehouse
                .register_job(&mut catalog, &format!("job{}", i))
                .unwrap();
        }
        drop(catalog);

        let ids = warehouse.job_ids().unwrap();
        assert_eq!(ids.len(), JOB_HISTORY);
        assert_eq!(ids[0], "job1");
    }

    fn query_rows(warehouse: &MemoryWarehouse, job_id: &str, sql: &str) -> Vec<Row> {
        let destination = warehouse.run_sql(job_id, sql).unwrap();
        warehouse.rows(&destination).unwrap().unwrap()
    }

    #[test]
    fn test_query_resolves_dataset_and_project_qualified_names() {
        let warehouse = MemoryWarehouse::new("my-project");
        let rows = vec![vec![Cell::Int(7), Cell::Str("x".into())]];
        let stored = TableReference::new("my-project", "my_dataset", "example_table_1");
        warehouse
            .create_table(stored, numbers_schema(), rows.clone())
            .unwrap();

        let by_dataset = query_rows(
            &warehouse,
            "q1",
            "select n, label from my_dataset.example_table_1;",
        );
        let by_project = query_rows(
            &warehouse,
            "q2",
            "select n, label from `my-project.my_dataset.example_table_1`",
        );
        assert_eq!(by_dataset, rows);
        assert_eq!(by_project, rows);
    }

    #[test]
    fn test_same_table_id_in_two_datasets() {
        let warehouse = MemoryWarehouse::new("proj");
        let schema = vec![SchemaField::new("n", FieldType::Integer)];
        for (dataset, n) in [("a", 1), ("b", 2)] {
            warehouse
                .create_table(
                    TableReference::new("proj", dataset, "t"),
                    schema.clone(),
                    vec![vec![Cell::Int(n)]],
                )
                .unwrap();
        }

        let from_a = query_rows(&warehouse, "q1", "select n from a.t");
        let from_b = query_rows(&warehouse, "q2", "select n from b.t");
        assert_eq!(from_a, vec![vec![Cell::Int(1)]]);
        assert_eq!(from_b, vec![vec![Cell::Int(2)]]);

        let err = warehouse.run_sql("q3", "select n from t").unwrap_err();
        assert!(err.contains("ambiguous"));
    }

    #[test]
    fn test_query_only_reads_named_tables() {
        let warehouse = MemoryWarehouse::new("proj");
        warehouse
            .insert_frame(reference("good"), &df! { "a" => [1i64, 2] }.unwrap())
            .unwrap();
        // Text in an INTEGER column cannot become a frame
        warehouse
            .create_table(
                reference("broken"),
                vec![SchemaField::new("n", FieldType::Integer)],
                vec![vec![Cell::Str("oops".into())]],
            )
            .unwrap();

        let rows = query_rows(&warehouse, "q1", "select a from good");
        assert_eq!(rows, vec![vec![Cell::Int(1)], vec![Cell::Int(2)]]);

        // Earlier results are not queryable relations
        let anon = "select a from anon_q1";
        assert!(warehouse.run_sql("q2", anon).is_err());
    }

    #[tokio::test]
    async fn test_query_failure_is_reported_by_wait() {
        let warehouse = MemoryWarehouse::new("proj");
        let mut job = warehouse
            .run_async_query("q1", "select nope from nowhere", &QueryOptions::default())
            .await
            .unwrap();

        assert!(matches!(job.state(), JobState::Failed(_)));
        assert!(matches!(job.wait().await, Err(GbqError::JobFailed { .. })));
    }
}
