//! Rows <-> Polars DataFrame conversion
//!
//! Column names and dtypes of a downloaded frame always come from the table's
//! declared schema, never from the fetched rows, so an empty download still
//! has the right shape.

use super::cell::{Cell, Row};
use super::error::{GbqError, Result};
use super::schema::{FieldType, SchemaField};
use polars::prelude::*;

const NULL_CELL: &Cell = &Cell::Null;

/// Polars dtype used for a warehouse column
pub fn dtype_for(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Integer => DataType::Int64,
        FieldType::Float | FieldType::Numeric => DataType::Float64,
        FieldType::Boolean => DataType::Boolean,
        _ => DataType::String,
    }
}

/// Build a DataFrame with one column per schema field, in schema order
pub fn rows_to_frame(schema: &[SchemaField], rows: &[Row]) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(schema.len());

    for (idx, field) in schema.iter().enumerate() {
        let cells = rows.iter().map(|row| row.get(idx).unwrap_or(NULL_CELL));
        let series = cells_to_series(field, cells)?;
        columns.push(series.into_column());
    }

    Ok(DataFrame::new(columns)?)
}

fn cells_to_series<'a>(
    field: &SchemaField,
    cells: impl Iterator<Item = &'a Cell>,
) -> Result<Series> {
    let name: PlSmallStr = field.name.as_str().into();

    let mismatch = |cell: &Cell, expected: &'static str| GbqError::Parse {
        column: field.name.clone(),
        value: format!("{:?}", cell),
        expected,
    };

    let series = match dtype_for(field.field_type) {
        DataType::Int64 => {
            let values = cells
                .map(|cell| match cell {
                    Cell::Null => Ok(None),
                    Cell::Int(v) => Ok(Some(*v)),
                    other => Err(mismatch(other, "INTEGER")),
                })
                .collect::<Result<Vec<Option<i64>>>>()?;
            Series::new(name, values)
        }
        DataType::Float64 => {
            let values = cells
                .map(|cell| match cell {
                    Cell::Null => Ok(None),
                    other => other
                        .as_f64()
                        .map(Some)
                        .ok_or_else(|| mismatch(other, "FLOAT")),
                })
                .collect::<Result<Vec<Option<f64>>>>()?;
            Series::new(name, values)
        }
        DataType::Boolean => {
            let values = cells
                .map(|cell| match cell {
                    Cell::Null => Ok(None),
                    other => other
                        .as_bool()
                        .map(Some)
                        .ok_or_else(|| mismatch(other, "BOOLEAN")),
                })
                .collect::<Result<Vec<Option<bool>>>>()?;
            Series::new(name, values)
        }
        _ => {
            let values: Vec<Option<String>> = cells.map(Cell::to_text).collect();
            Series::new(name, values)
        }
    };

    Ok(series)
}

/// Infer a warehouse schema from a frame's dtypes and split it into rows
///
/// Integer dtypes become INTEGER, floats FLOAT, booleans BOOLEAN; everything
/// else is cast to text and stored as STRING.
pub fn frame_to_rows(df: &DataFrame) -> Result<(Vec<SchemaField>, Vec<Row>)> {
    let height = df.height();
    let mut schema = Vec::with_capacity(df.width());
    let mut rows: Vec<Row> = (0..height).map(|_| Vec::with_capacity(df.width())).collect();

    for col in df.get_columns() {
        let series = col.as_materialized_series();
        let name = series.name().to_string();

        let field_type = match series.dtype() {
            dt if dt.is_integer() => FieldType::Integer,
            dt if dt.is_float() => FieldType::Float,
            DataType::Boolean => FieldType::Boolean,
            _ => FieldType::String,
        };

        let cells: Vec<Cell> = match field_type {
            FieldType::Integer => series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|opt| opt.map(Cell::Int).unwrap_or(Cell::Null))
                .collect(),
            FieldType::Float => series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|opt| opt.map(Cell::Float).unwrap_or(Cell::Null))
                .collect(),
            FieldType::Boolean => series
                .bool()?
                .into_iter()
                .map(|opt| opt.map(Cell::Bool).unwrap_or(Cell::Null))
                .collect(),
            _ => series
                .cast(&DataType::String)?
                .str()?
                .into_iter()
                .map(|opt| opt.map(|s| Cell::Str(s.to_string())).unwrap_or(Cell::Null))
                .collect(),
        };

        for (row, cell) in rows.iter_mut().zip(cells) {
            row.push(cell);
        }
        schema.push(SchemaField::new(name, field_type));
    }

    Ok((schema, rows))
}
