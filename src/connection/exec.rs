use crate::cursor::Cursor;
use crate::error::SqlBridgeError;
use crate::results::Row;
use crate::types::Params;

use super::Connection;

impl Connection {
    /// Create a cursor bound to this connection.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] if the connection is not open.
    pub fn cursor(&self) -> Result<Cursor, SqlBridgeError> {
        self.ensure_open()?;
        Ok(Cursor::new(self.clone()))
    }

    /// Run one statement on a new cursor and hand the cursor back for fetching.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::OperationalError`] if the driver rejects the statement and
    /// [`SqlBridgeError::UsageError`] if the connection is not open or the parameters do not
    /// match the statement.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<Cursor, SqlBridgeError> {
        let mut cursor = self.cursor()?;
        cursor.execute(sql, params).await?;
        Ok(cursor)
    }

    /// Run one statement once per parameter set on a new cursor.
    ///
    /// # Errors
    /// See [`Cursor::executemany`].
    pub async fn executemany<I, P>(
        &self,
        sql: impl Into<String>,
        seq_of_params: I,
    ) -> Result<Cursor, SqlBridgeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let mut cursor = self.cursor()?;
        cursor.executemany(sql, seq_of_params).await?;
        Ok(cursor)
    }

    /// Commit any pending transaction, then run a semicolon-separated batch of statements.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::OperationalError`] for the first failing statement; statements
    /// before it stay applied.
    pub async fn executescript(&self, sql: impl Into<String>) -> Result<(), SqlBridgeError> {
        self.ensure_open()?;
        let sql = sql.into();
        self.inner
            .worker
            .call("executescript", move |state| state.execute_script(&sql))
            .await
    }

    /// Run an `INSERT` and return the rowid of the inserted row.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] if the statement is not an insert.
    pub async fn execute_insert(
        &self,
        sql: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<i64, SqlBridgeError> {
        let mut cursor = self.execute(sql, params).await?;
        let rowid = cursor
            .lastrowid()
            .ok_or_else(|| SqlBridgeError::usage("execute_insert() needs an INSERT statement"));
        cursor.close().await?;
        rowid
    }

    /// Run a query and return every row it produces.
    ///
    /// # Errors
    /// Same as [`Connection::execute`] followed by [`Cursor::fetchall`].
    pub async fn execute_fetchall(
        &self,
        sql: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<Vec<Row>, SqlBridgeError> {
        let mut cursor = self.execute(sql, params).await?;
        let rows = cursor.fetchall().await?;
        cursor.close().await?;
        Ok(rows)
    }

    /// Run synchronous `rusqlite` logic against the worker-owned connection.
    ///
    /// The closure runs on the worker thread in queue order, like any other operation.
    ///
    /// # Errors
    /// Propagates the closure's error, or [`SqlBridgeError::UsageError`] if the connection is
    /// not open.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, SqlBridgeError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlBridgeError> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_open()?;
        self.inner
            .worker
            .call("with_connection", move |state| state.with_connection(func))
            .await
    }
}
