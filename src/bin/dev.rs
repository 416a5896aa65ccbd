//! Development round trip against a real BigQuery project
//!
//! Uploads a 10 x 4 frame of floats, downloads it back, then queries two of
//! its columns.
//!
//! Usage:
//! ```bash
//! export GBQ_CREDENTIALS=/path/to/service-account.json
//! export GBQ_DATASET=my_dataset
//! RUST_LOG=gbq_polars=debug cargo run --bin dev
//! ```

use anyhow::Context;
use gbq_polars::gbq::{
    BigQueryClient, FieldType, SchemaField, TableReference, Warehouse, WriteMode,
};
use polars::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = BigQueryClient::from_env()
        .await
        .context("failed to configure BigQuery client")?;
    let dataset = std::env::var("GBQ_DATASET").unwrap_or_else(|_| "my_dataset".to_string());
    let table_id = "example_table_1";

    println!("=== gbq_polars - Development Mode ===\n");
    println!("  Project: {}", client.project_id());
    println!("  Table:   {}.{}\n", dataset, table_id);

    // Upload
    let schema: Vec<SchemaField> = (1..=4)
        .map(|i| SchemaField::new(format!("field{}", i), FieldType::Float).required())
        .collect();
    let reference = TableReference::new(client.project_id(), dataset.as_str(), table_id);
    let table = client.table_with_schema(reference, schema);

    let df = sample_frame(10, 4)?;
    println!("Uploading {} rows...", df.height());
    gbq_polars::upload(&df, &table, WriteMode::Truncate, true)
        .await
        .context("upload failed")?;
    println!("✓ Uploaded\n");

    // Download
    let mut table = client.dataset_table(&dataset, table_id);
    let downloaded = gbq_polars::download(&mut table, None)
        .await
        .context("download failed")?;
    println!("Downloaded:\n{}\n", downloaded);

    // Query
    let sql = format!("select field1, field2 from {}.{};", dataset, table_id);
    let result = gbq_polars::query(&sql, &client)
        .await
        .context("query failed")?;
    println!("Query result:\n{}", result);

    Ok(())
}

/// Deterministic pseudo-random floats in [0, 1)
fn sample_frame(rows: usize, cols: usize) -> PolarsResult<DataFrame> {
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let columns = (0..cols)
        .map(|c| {
            let values: Vec<f64> = (0..rows)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 7;
                    seed ^= seed << 17;
                    (seed >> 11) as f64 / (1u64 << 53) as f64
                })
                .collect();
            Series::new(format!("{}", c).into(), values).into_column()
        })
        .collect();
    DataFrame::new(columns)
}
