use rusqlite::types::ValueRef;
use serde::Deserialize;

use crate::error::SqlBridgeError;
use crate::types::Value;

use super::row::{Columns, NamedRow, Row};

/// How fetched rows are shaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFactory {
    /// Plain positional rows ([`Row::Tuple`]).
    #[default]
    Tuple,
    /// Rows addressable by position and column name ([`Row::Named`]).
    Named,
}

/// How TEXT column values are decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFactory {
    /// Strict UTF-8 into [`Value::Text`]; invalid UTF-8 fails the fetch.
    #[default]
    String,
    /// Raw bytes into [`Value::Blob`].
    Bytes,
    /// UTF-8 with invalid sequences replaced, into [`Value::Text`].
    LossyString,
}

/// Both materialization settings, captured together when a fetch is submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Factories {
    pub(crate) row: RowFactory,
    pub(crate) text: TextFactory,
}

/// A column value as stored by the worker before any text decoding.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for RawValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => RawValue::Null,
            ValueRef::Integer(i) => RawValue::Integer(i),
            ValueRef::Real(f) => RawValue::Real(f),
            ValueRef::Text(bytes) => RawValue::Text(bytes.to_vec()),
            ValueRef::Blob(bytes) => RawValue::Blob(bytes.to_vec()),
        }
    }
}

impl TextFactory {
    fn decode(self, column: usize, bytes: &[u8]) -> Result<Value, SqlBridgeError> {
        match self {
            TextFactory::String => std::str::from_utf8(bytes)
                .map(|text| Value::Text(text.to_owned()))
                .map_err(|_| SqlBridgeError::TextDecodeError { column }),
            TextFactory::Bytes => Ok(Value::Blob(bytes.to_vec())),
            TextFactory::LossyString => Ok(Value::Text(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
        }
    }
}

/// Materialize one buffered row with the given factories, leaving the buffer intact.
///
/// # Errors
/// Returns [`SqlBridgeError::TextDecodeError`] when [`TextFactory::String`] meets invalid UTF-8.
pub(crate) fn materialize(
    factories: Factories,
    columns: &Columns,
    raw: &[RawValue],
) -> Result<Row, SqlBridgeError> {
    let values = raw
        .iter()
        .enumerate()
        .map(|(column, value)| match value {
            RawValue::Null => Ok(Value::Null),
            RawValue::Integer(i) => Ok(Value::Integer(*i)),
            RawValue::Real(f) => Ok(Value::Real(*f)),
            RawValue::Text(bytes) => factories.text.decode(column, bytes),
            RawValue::Blob(bytes) => Ok(Value::Blob(bytes.clone())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match factories.row {
        RowFactory::Tuple => Row::Tuple(values),
        RowFactory::Named => Row::Named(NamedRow::new(columns.clone(), values)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Columns {
        Columns::new(vec!["k".into(), "d".into()])
    }

    fn raw() -> Vec<RawValue> {
        vec![RawValue::Integer(1), RawValue::Text(b"hi".to_vec())]
    }

    #[test]
    fn default_factories_give_tuples_of_strings() {
        let row = materialize(Factories::default(), &columns(), &raw()).unwrap();
        assert_eq!(row, Row::Tuple(vec![Value::Integer(1), Value::from("hi")]));
    }

    #[test]
    fn bytes_factory_keeps_text_undecoded() {
        let factories = Factories {
            row: RowFactory::Named,
            text: TextFactory::Bytes,
        };
        let row = materialize(factories, &columns(), &raw()).unwrap();
        assert_eq!(row.get_named("d").unwrap(), &Value::Blob(b"hi".to_vec()));
    }

    #[test]
    fn invalid_utf8_depends_on_factory() {
        let bad = vec![RawValue::Null, RawValue::Text(vec![0x68, 0xff])];
        let err = materialize(Factories::default(), &columns(), &bad).unwrap_err();
        assert!(matches!(err, SqlBridgeError::TextDecodeError { column: 1 }));

        let lossy = Factories {
            row: RowFactory::Tuple,
            text: TextFactory::LossyString,
        };
        let row = materialize(lossy, &columns(), &bad).unwrap();
        assert_eq!(row[1], Value::Text("h\u{fffd}".into()));
    }
}
