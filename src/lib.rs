//! Async access to SQLite through one dedicated worker thread per connection.
//!
//! Each [`Connection`] owns a background thread that holds the `rusqlite` handle and runs
//! queued operations strictly one at a time, in the order they were submitted. Callers await
//! results without blocking their runtime; independent connections run in parallel.
//!
//! ```rust,no_run
//! use sqlite_bridge::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlBridgeError> {
//! let conn = sqlite_bridge::connect(":memory:").await?;
//! conn.executescript("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").await?;
//! conn.execute("INSERT INTO t (name) VALUES (?)", [Value::from("alice")]).await?;
//! conn.commit().await?;
//!
//! conn.set_row_factory(RowFactory::Named);
//! for row in conn.execute_fetchall("SELECT id, name FROM t", ()).await? {
//!     println!("{:?}", row.get_named("name")?);
//! }
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod cursor;
mod error;
mod params;
mod query;
mod results;
mod types;
mod worker;

pub mod prelude;
pub mod scope;

pub use config::{ConnectOptions, ConnectOptionsBuilder, IsolationLevel};
pub use connection::{Connection, ConnectionState};
pub use cursor::Cursor;
pub use error::{ErrorKind, SqlBridgeError};
pub use params::value_to_sqlite_value;
pub use results::{Columns, NamedRow, Row, RowFactory, TextFactory};
pub use types::{Params, Value};

/// Create a connection and open it.
///
/// # Errors
/// Returns [`SqlBridgeError::ConfigError`] for invalid options and
/// [`SqlBridgeError::OpenError`] if SQLite cannot open the target.
pub async fn connect(options: impl Into<ConnectOptions>) -> Result<Connection, SqlBridgeError> {
    let conn = Connection::new(options)?;
    conn.open().await?;
    Ok(conn)
}
