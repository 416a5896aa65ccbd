//! Table references, schema fields and job options
//!
//! These types mirror the JSON shapes used by the BigQuery REST API so they can
//! be (de)serialized directly into request and response payloads.

use super::error::GbqError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fully qualified location of a warehouse table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Declared type of a warehouse column
///
/// Standard SQL aliases (`INT64`, `FLOAT64`, `BOOL`, `BIGNUMERIC`) are accepted
/// when decoding; unknown types fall back to `Other` and are read as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    #[serde(alias = "INT64")]
    Integer,
    #[serde(alias = "FLOAT64")]
    Float,
    #[serde(alias = "BIGNUMERIC")]
    Numeric,
    #[serde(alias = "BOOL")]
    Boolean,
    Date,
    Timestamp,
    Bytes,
    #[serde(other)]
    Other,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Numeric => "NUMERIC",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::Bytes => "BYTES",
            Self::Other => "STRING",
        }
    }
}

impl FromStr for FieldType {
    type Err = GbqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRING" => Ok(Self::String),
            "INTEGER" | "INT64" => Ok(Self::Integer),
            "FLOAT" | "FLOAT64" => Ok(Self::Float),
            "NUMERIC" | "BIGNUMERIC" => Ok(Self::Numeric),
            "BOOLEAN" | "BOOL" => Ok(Self::Boolean),
            "DATE" => Ok(Self::Date),
            "TIMESTAMP" => Ok(Self::Timestamp),
            "BYTES" => Ok(Self::Bytes),
            other => Err(GbqError::Other(format!("Unknown field type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

/// One column of a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mode: FieldMode,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = FieldMode::Required;
        self
    }
}

/// What an upload does when the target table already holds data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteMode {
    /// Fail the job if the target has rows
    #[default]
    #[serde(rename = "WRITE_EMPTY")]
    RequireEmpty,
    /// Replace the target's rows
    #[serde(rename = "WRITE_TRUNCATE")]
    Truncate,
    /// Add to the target's rows
    #[serde(rename = "WRITE_APPEND")]
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequireEmpty => "WRITE_EMPTY",
            Self::Truncate => "WRITE_TRUNCATE",
            Self::Append => "WRITE_APPEND",
        }
    }
}

impl FromStr for WriteMode {
    type Err = GbqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WRITE_EMPTY" | "REQUIRE_EMPTY" | "EMPTY" => Ok(Self::RequireEmpty),
            "WRITE_TRUNCATE" | "TRUNCATE" => Ok(Self::Truncate),
            "WRITE_APPEND" | "APPEND" => Ok(Self::Append),
            other => Err(GbqError::Other(format!(
                "Unknown write disposition: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a load job may create its destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CreateMode {
    #[default]
    #[serde(rename = "CREATE_IF_NEEDED")]
    CreateIfNeeded,
    #[serde(rename = "CREATE_NEVER")]
    CreateNever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceFormat {
    #[default]
    #[serde(rename = "CSV")]
    Csv,
}

/// Settings passed to a table's file upload primitive
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub encoding: &'static str,
    pub source_format: SourceFormat,
    pub skip_leading_rows: u32,
    pub create_disposition: CreateMode,
    pub write_disposition: WriteMode,
}

impl LoadOptions {
    /// UTF-8 CSV with one header row, creating the table when it is missing
    pub fn csv(write_disposition: WriteMode) -> Self {
        Self {
            encoding: "UTF-8",
            source_format: SourceFormat::Csv,
            skip_leading_rows: 1,
            create_disposition: CreateMode::CreateIfNeeded,
            write_disposition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub use_legacy_sql: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_legacy_sql: false,
        }
    }
}
