//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types
//! to make it easier to get started with the library.

pub use crate::config::{ConnectOptions, IsolationLevel};
pub use crate::connection::{Connection, ConnectionState};
pub use crate::cursor::Cursor;
pub use crate::error::{ErrorKind, SqlBridgeError};
pub use crate::results::{NamedRow, Row, RowFactory, TextFactory};
pub use crate::scope::{Scoped, using};
pub use crate::types::{Params, Value};
pub use crate::connect;
