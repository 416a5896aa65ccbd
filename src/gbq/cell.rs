//! Scalar values fetched from or loaded into warehouse tables
//!
//! The warehouse hands back every value as text (or null). Cells are typed by
//! parsing that text against the column's declared [`FieldType`].

use super::error::{GbqError, Result};
use super::schema::{FieldType, SchemaField};

/// One scalar value of a row
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One table row, aligned with the table's schema
pub type Row = Vec<Cell>;

impl Cell {
    /// Parse warehouse text into a cell of the field's declared type
    pub fn parse(field: &SchemaField, text: Option<&str>) -> Result<Cell> {
        let Some(text) = text else {
            return Ok(Cell::Null);
        };

        let parse_err = |expected: &'static str| GbqError::Parse {
            column: field.name.clone(),
            value: text.to_string(),
            expected,
        };

        match field.field_type {
            FieldType::Integer => {
                if text.is_empty() {
                    return Ok(Cell::Null);
                }
                text.trim()
                    .parse::<i64>()
                    .map(Cell::Int)
                    .map_err(|_| parse_err("INTEGER"))
            }
            FieldType::Float | FieldType::Numeric => {
                if text.is_empty() {
                    return Ok(Cell::Null);
                }
                text.trim()
                    .parse::<f64>()
                    .map(Cell::Float)
                    .map_err(|_| parse_err("FLOAT"))
            }
            FieldType::Boolean => match text.trim().to_lowercase().as_str() {
                "" => Ok(Cell::Null),
                "true" | "1" => Ok(Cell::Bool(true)),
                "false" | "0" => Ok(Cell::Bool(false)),
                _ => Err(parse_err("BOOLEAN")),
            },
            _ => Ok(Cell::Str(text.to_string())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text rendering for string-typed columns
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(v) => Some(v.to_string()),
            Cell::Int(v) => Some(v.to_string()),
            Cell::Float(v) => Some(v.to_string()),
            Cell::Str(s) => Some(s.clone()),
        }
    }
}
