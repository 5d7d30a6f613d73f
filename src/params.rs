use rusqlite::Statement;

use crate::error::SqlBridgeError;
use crate::types::{Params, Value};

/// Convert a single [`Value`] to a rusqlite `Value`.
#[must_use]
pub fn value_to_sqlite_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(bytes) => rusqlite::types::Value::Blob(bytes.clone()),
    }
}

/// Bind `params` onto a prepared statement, replacing every previous binding.
///
/// The number of supplied parameters must match the number of placeholders.
///
/// # Errors
/// Returns [`SqlBridgeError::UsageError`] on a count or name mismatch and
/// [`SqlBridgeError::OperationalError`] if the driver refuses a binding.
pub(crate) fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<(), SqlBridgeError> {
    let expected = stmt.parameter_count();
    if params.len() != expected {
        return Err(SqlBridgeError::usage(format!(
            "incorrect number of bindings supplied: statement uses {expected}, {} supplied",
            params.len()
        )));
    }

    match params {
        Params::None => {}
        Params::Positional(values) => {
            for (idx, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(idx + 1, value_to_sqlite_value(value))?;
            }
        }
        Params::Named(pairs) => {
            for (name, value) in pairs {
                let idx = stmt.parameter_index(name)?.ok_or_else(|| {
                    SqlBridgeError::usage(format!("statement has no parameter named {name}"))
                })?;
                stmt.raw_bind_parameter(idx, value_to_sqlite_value(value))?;
            }
        }
    }
    Ok(())
}
