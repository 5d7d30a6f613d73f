use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::SqlBridgeError;
use crate::types::Value;

/// Column names of one result set, shared by every row materialized from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    names: Arc<Vec<String>>,
    // Internal cache for faster column lookups
    index_cache: Arc<HashMap<String, usize>>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let index_cache = names
            .iter()
            .enumerate()
            .rev()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names: Arc::new(names),
            index_cache: Arc::new(index_cache),
        }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    ///
    /// Exact matches win; otherwise the first column whose name matches ignoring ASCII case.
    #[must_use]
    pub fn index_of(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.index_cache.get(column_name) {
            return Some(idx);
        }

        // Fall back to linear search
        self.names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }
}

/// A row addressable by position and by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRow {
    columns: Columns,
    values: Vec<Value>,
}

impl NamedRow {
    pub(crate) fn new(columns: Columns, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names, in result order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.columns
            .index_of(column_name)
            .and_then(|idx| self.values.get(idx))
    }
}

/// One immutable result row.
///
/// The representation is fixed by the connection's [`RowFactory`](crate::RowFactory) at the
/// moment the row was fetched; changing the factory later does not affect rows already held.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Positional access only.
    Tuple(Vec<Value>),
    /// Positional and by-name access.
    Named(NamedRow),
}

impl Row {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Get a value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values().get(index)
    }

    /// Get a value by column name.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] for tuple rows, which only support positional
    /// access, and for names that are not in the result.
    pub fn get_named(&self, column_name: &str) -> Result<&Value, SqlBridgeError> {
        match self {
            Row::Tuple(_) => Err(SqlBridgeError::usage(format!(
                "tuple rows are only indexable by position, not by name {column_name:?}"
            ))),
            Row::Named(row) => row
                .get(column_name)
                .ok_or_else(|| SqlBridgeError::usage(format!("no column named {column_name:?}"))),
        }
    }

    /// Column names, when the row carries them.
    #[must_use]
    pub fn keys(&self) -> Option<&[String]> {
        match self {
            Row::Tuple(_) => None,
            Row::Named(row) => Some(row.keys()),
        }
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        match self {
            Row::Tuple(values) => values,
            Row::Named(row) => &row.values,
        }
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Row::Tuple(values) => values,
            Row::Named(row) => row.values,
        }
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values()[index]
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Row::Tuple(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Row::Named(row) => {
                let mut map = serializer.serialize_map(Some(row.values.len()))?;
                for (name, value) in row.keys().iter().zip(&row.values) {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}
