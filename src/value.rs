//! Positional parameter values and result rows.
//!
//! `ParamValue` is the unified bind-value type: parameters are bound to
//! statements positionally, in list order. `Row` is the driver-agnostic
//! result row handed to caller-supplied row mappers; cells are
//! `serde_json::Value` so callers map into their own domain types.

use crate::error::{DbError, DbResult};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(JsonValue),
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

/// One result row: ordered cells plus shared column names.
///
/// Column names are behind an `Arc` so every row of a result set shares one
/// allocation.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<JsonValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<JsonValue>) -> Self {
        Self { columns, values }
    }

    /// Column names in result-set order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Cell by zero-based position.
    pub fn get(&self, index: usize) -> Option<&JsonValue> {
        self.values.get(index)
    }

    /// Cell by column name.
    pub fn get_named(&self, name: &str) -> Option<&JsonValue> {
        let index = self.columns.iter().position(|c| c == name)?;
        self.values.get(index)
    }

    /// Cell by position, as i64.
    pub fn get_i64(&self, index: usize) -> DbResult<i64> {
        self.get(index)
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| DbError::invalid_input(format!("column {} is not an integer", index)))
    }

    /// Cell by position, as a string slice.
    pub fn get_str(&self, index: usize) -> DbResult<&str> {
        self.get(index)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DbError::invalid_input(format!("column {} is not a string", index)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<JsonValue> {
        self.values
    }
}
