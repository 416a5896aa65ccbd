use gbq_polars::gbq::{
    Cell, FieldType, GbqError, JobState, MemoryWarehouse, RemoteTable, SchemaField,
    TableReference, TransferJob, Warehouse, WriteMode,
};
use gbq_polars::{download, query, upload, upload_with, UploadOptions};
use polars::prelude::*;

fn reference(table: &str) -> TableReference {
    TableReference::new("proj", "my_dataset", table)
}

fn float_schema(n: usize) -> Vec<SchemaField> {
    (1..=n)
        .map(|i| SchemaField::new(format!("field{}", i), FieldType::Float).required())
        .collect()
}

/// 10 x 4 frame with pandas-style positional column names
fn numeric_frame() -> DataFrame {
    let columns = (0..4)
        .map(|c| {
            let values: Vec<f64> = (0..10).map(|r| r as f64 / 7.0 + c as f64 * 0.1).collect();
            Series::new(format!("{}", c).into(), values).into_column()
        })
        .collect();
    DataFrame::new(columns).unwrap()
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect()
}

fn staging_options(dir: &std::path::Path, write_mode: WriteMode) -> UploadOptions {
    UploadOptions {
        write_mode,
        blocking: true,
        staging_dir: Some(dir.to_path_buf()),
    }
}

fn dir_is_empty(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_upload_then_download_numeric_frame() {
    let warehouse = MemoryWarehouse::new("proj");
    let table = warehouse.table_with_schema(reference("example_table_1"), float_schema(4));
    let df = numeric_frame();

    let job = upload(&df, &table, WriteMode::default(), true).await.unwrap();
    assert_eq!(job.state(), &JobState::Done);

    let mut table = warehouse.dataset_table("my_dataset", "example_table_1");
    let downloaded = download(&mut table, None).await.unwrap();

    assert_eq!(downloaded.shape(), (10, 4));
    assert_eq!(
        column_names(&downloaded),
        vec!["field1", "field2", "field3", "field4"]
    );
    assert_eq!(table.num_rows(), Some(10));

    for (original, fetched) in df.get_columns().iter().zip(downloaded.get_columns()) {
        let original = original.as_materialized_series().f64().unwrap();
        let fetched = fetched.as_materialized_series().f64().unwrap();
        for (a, b) in original.into_iter().zip(fetched.into_iter()) {
            assert!((a.unwrap() - b.unwrap()).abs() < 1e-12);
        }
    }
}

#[tokio::test]
async fn test_round_trip_keeps_columns_and_values() {
    let warehouse = MemoryWarehouse::new("proj");
    let schema = vec![
        SchemaField::new("id", FieldType::Integer),
        SchemaField::new("score", FieldType::Float),
        SchemaField::new("label", FieldType::String),
        SchemaField::new("flag", FieldType::Boolean),
    ];
    let table = warehouse.table_with_schema(reference("mixed"), schema);
    let df = df! {
        "id" => [1i64, 2, 3],
        "score" => [0.5f64, -1.25, 3.0],
        "label" => ["a", "b c", "d,e"],
        "flag" => [true, false, true]
    }
    .unwrap();

    upload(&df, &table, WriteMode::RequireEmpty, true)
        .await
        .unwrap();

    let mut table = warehouse.table(reference("mixed"));
    let downloaded = download(&mut table, None).await.unwrap();

    assert_eq!(column_names(&downloaded), column_names(&df));
    assert!(downloaded.equals(&df));
}

#[tokio::test]
async fn test_download_row_limits() {
    let warehouse = MemoryWarehouse::new("proj").with_page_size(4);
    let rows = (0..10).map(|i| vec![Cell::Int(i), Cell::Float(i as f64)]).collect();
    let schema = vec![
        SchemaField::new("n", FieldType::Integer),
        SchemaField::new("x", FieldType::Float),
    ];
    warehouse.create_table(reference("t"), schema, rows).unwrap();

    for (limit, expected) in [(Some(0), 0), (Some(3), 3), (Some(10), 10), (Some(25), 10)] {
        let mut table = warehouse.table(reference("t"));
        let df = download(&mut table, limit).await.unwrap();
        assert_eq!(df.shape(), (expected, 2), "limit {:?}", limit);
        assert_eq!(column_names(&df), vec!["n", "x"]);
    }

    let mut table = warehouse.table(reference("t"));
    let unbounded = download(&mut table, None).await.unwrap();
    let negative = download(&mut table, Some(-5)).await.unwrap();
    assert_eq!(unbounded.height(), 10);
    assert!(negative.equals(&unbounded));
}

#[tokio::test]
async fn test_limit_stops_paging_early() {
    let warehouse = MemoryWarehouse::new("proj").with_page_size(2);
    let rows = (0..100).map(|i| vec![Cell::Int(i)]).collect();
    warehouse
        .create_table(
            reference("big"),
            vec![SchemaField::new("n", FieldType::Integer)],
            rows,
        )
        .unwrap();

    let mut table = warehouse.table(reference("big"));
    let df = download(&mut table, Some(3)).await.unwrap();

    assert_eq!(df.height(), 3);
    assert_eq!(warehouse.page_requests(), 2);
}

#[tokio::test]
async fn test_download_missing_table_fails() {
    let warehouse = MemoryWarehouse::new("proj");
    let mut table = warehouse.table(reference("nope"));
    let err = download(&mut table, None).await.unwrap_err();
    assert!(matches!(err, GbqError::TableNotFound(_)));
}

#[tokio::test]
async fn test_staged_file_removed_after_success_and_failure() {
    let warehouse = MemoryWarehouse::new("proj");
    let staging = tempfile::tempdir().unwrap();
    let table = warehouse.table_with_schema(reference("t"), float_schema(4));
    let df = numeric_frame();

    upload_with(&df, &table, &staging_options(staging.path(), WriteMode::RequireEmpty))
        .await
        .unwrap();
    assert!(dir_is_empty(staging.path()));

    // Second upload into a non-empty table fails at the wait
    let err = upload_with(&df, &table, &staging_options(staging.path(), WriteMode::RequireEmpty))
        .await
        .unwrap_err();
    assert!(matches!(err, GbqError::JobFailed { .. }));
    assert!(dir_is_empty(staging.path()));

    // Serialization failure before anything is submitted
    let nested = Series::new(
        "nested".into(),
        [Series::new("".into(), [1i64]), Series::new("".into(), [2i64])],
    );
    let bad = DataFrame::new(vec![nested.into_column()]).unwrap();
    let err = upload_with(&bad, &table, &staging_options(staging.path(), WriteMode::Append))
        .await
        .unwrap_err();
    assert!(matches!(err, GbqError::Polars(_)));
    assert!(dir_is_empty(staging.path()));
}

#[tokio::test]
async fn test_write_modes() {
    let warehouse = MemoryWarehouse::new("proj");
    let table = warehouse.table_with_schema(
        reference("modes"),
        vec![SchemaField::new("n", FieldType::Integer)],
    );
    let first = df! { "n" => [1i64, 2] }.unwrap();
    let second = df! { "n" => [3i64] }.unwrap();
    let stored = |warehouse: &MemoryWarehouse| -> Vec<i64> {
        warehouse
            .rows(&reference("modes"))
            .unwrap()
            .unwrap()
            .iter()
            .map(|row| row[0].as_i64().unwrap())
            .collect()
    };

    upload(&first, &table, WriteMode::RequireEmpty, true)
        .await
        .unwrap();
    assert_eq!(stored(&warehouse), vec![1, 2]);

    let err = upload(&second, &table, WriteMode::RequireEmpty, true)
        .await
        .unwrap_err();
    assert!(matches!(err, GbqError::JobFailed { .. }));
    assert_eq!(stored(&warehouse), vec![1, 2]);

    upload(&second, &table, WriteMode::Append, true).await.unwrap();
    assert_eq!(stored(&warehouse), vec![1, 2, 3]);

    upload(&second, &table, WriteMode::Truncate, true)
        .await
        .unwrap();
    assert_eq!(stored(&warehouse), vec![3]);
}

#[tokio::test]
async fn test_non_blocking_upload_returns_job_to_wait_on() {
    let warehouse = MemoryWarehouse::new("proj");
    let table = warehouse.table_with_schema(
        reference("later"),
        vec![SchemaField::new("n", FieldType::Integer)],
    );
    let df = df! { "n" => [1i64] }.unwrap();

    let mut ok_job = upload(&df, &table, WriteMode::RequireEmpty, false)
        .await
        .unwrap();
    ok_job.wait().await.unwrap();

    // The failure surfaces only when the caller waits
    let mut failing_job = upload(&df, &table, WriteMode::RequireEmpty, false)
        .await
        .unwrap();
    assert!(matches!(failing_job.state(), JobState::Failed(_)));
    assert!(matches!(
        failing_job.wait().await,
        Err(GbqError::JobFailed { .. })
    ));
}

#[tokio::test]
async fn test_upload_without_schema_to_missing_table_fails() {
    let warehouse = MemoryWarehouse::new("proj");
    let table = warehouse.table(reference("unknown"));
    let df = df! { "n" => [1i64] }.unwrap();

    let err = upload(&df, &table, WriteMode::RequireEmpty, true)
        .await
        .unwrap_err();
    assert!(matches!(err, GbqError::JobFailed { .. }));
}

#[tokio::test]
async fn test_query_selects_columns_in_order() {
    let warehouse = MemoryWarehouse::new("proj");
    let table = warehouse.table_with_schema(reference("t"), float_schema(4));
    upload(&numeric_frame(), &table, WriteMode::RequireEmpty, true)
        .await
        .unwrap();

    let result = query("select field1, field2 from t;", &warehouse)
        .await
        .unwrap();

    assert_eq!(column_names(&result), vec!["field1", "field2"]);
    assert_eq!(result.height(), 10);
}

#[tokio::test]
async fn test_query_dataset_qualified_table() {
    let warehouse = MemoryWarehouse::new("proj");
    let table = warehouse.table_with_schema(reference("example_table_1"), float_schema(4));
    upload(&numeric_frame(), &table, WriteMode::Truncate, true)
        .await
        .unwrap();

    let result = query(
        "select field1, field2 from my_dataset.example_table_1;",
        &warehouse,
    )
    .await
    .unwrap();

    assert_eq!(column_names(&result), vec!["field1", "field2"]);
    assert_eq!(result.height(), 10);
}

#[tokio::test]
async fn test_failed_upload_leaves_no_table() {
    let warehouse = MemoryWarehouse::new("proj");
    let table = warehouse.table_with_schema(
        reference("typed"),
        vec![SchemaField::new("n", FieldType::Integer)],
    );
    let df = df! { "n" => ["notanint"] }.unwrap();

    let err = upload(&df, &table, WriteMode::RequireEmpty, true)
        .await
        .unwrap_err();
    assert!(matches!(err, GbqError::JobFailed { .. }));

    let mut table = warehouse.table(reference("typed"));
    let err = download(&mut table, None).await.unwrap_err();
    assert!(matches!(err, GbqError::TableNotFound(_)));
}

#[tokio::test]
async fn test_query_job_ids_are_fresh() {
    let warehouse = MemoryWarehouse::new("proj");
    warehouse
        .insert_frame(reference("t"), &df! { "a" => [1i64, 2] }.unwrap())
        .unwrap();

    let sql = "select a from t";
    let first = query(sql, &warehouse).await.unwrap();
    let second = query(sql, &warehouse).await.unwrap();
    assert!(first.equals(&second));

    let ids = warehouse.job_ids().unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_query_failure_propagates() {
    let warehouse = MemoryWarehouse::new("proj");
    let err = query("select missing from nowhere", &warehouse)
        .await
        .unwrap_err();
    assert!(matches!(err, GbqError::JobFailed { .. }));
}
