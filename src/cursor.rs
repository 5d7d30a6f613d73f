use std::fmt;

use futures_util::StreamExt;
use futures_util::stream::{self, FusedStream};
use tracing::trace;

use crate::connection::Connection;
use crate::error::SqlBridgeError;
use crate::results::{Columns, Row};
use crate::types::Params;
use crate::worker::{CursorId, ExecuteSummary};

const DEFAULT_ARRAYSIZE: usize = 1;

/// Statement execution and forward-only traversal over one [`Connection`].
///
/// A cursor's operations go through its connection's queue, so they are ordered with every
/// other operation on that connection. Result rows are buffered on the worker thread and
/// materialized when fetched, using the connection's factories at fetch time.
///
/// Dropping an unclosed cursor queues the release of its buffered rows.
pub struct Cursor {
    conn: Connection,
    id: CursorId,
    closed: bool,
    rowcount: i64,
    lastrowid: Option<i64>,
    description: Option<Columns>,
    arraysize: usize,
}

impl Cursor {
    pub(crate) fn new(conn: Connection) -> Self {
        let id = conn.next_cursor_id();
        Self {
            conn,
            id,
            closed: false,
            rowcount: -1,
            lastrowid: None,
            description: None,
            arraysize: DEFAULT_ARRAYSIZE,
        }
    }

    fn ensure_usable(&self) -> Result<(), SqlBridgeError> {
        if self.closed {
            return Err(SqlBridgeError::usage("cursor closed"));
        }
        self.conn.ensure_open()
    }

    fn apply(&mut self, summary: ExecuteSummary) {
        self.description = summary.description;
        self.rowcount = summary.rowcount;
        if summary.lastrowid.is_some() {
            self.lastrowid = summary.lastrowid;
        }
    }

    /// Prepare and run one statement, discarding any rows left from the previous one.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::OperationalError`] if the driver rejects the statement and
    /// [`SqlBridgeError::UsageError`] if the cursor or its connection is closed or the
    /// parameters do not fit the statement.
    pub async fn execute(
        &mut self,
        sql: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<&mut Self, SqlBridgeError> {
        self.ensure_usable()?;
        let sql = sql.into();
        let params = params.into();
        let id = self.id;
        self.description = None;
        let summary = self
            .conn
            .inner
            .worker
            .call("execute", move |state| state.execute(id, &sql, &params))
            .await?;
        self.apply(summary);
        Ok(self)
    }

    /// Run one row-less statement once per parameter set, as a single queued operation.
    ///
    /// Nothing else on the connection runs between the individual executions. Executions that
    /// succeeded before a failing parameter set stay applied.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] for statements that return rows, otherwise the
    /// same errors as [`Cursor::execute`].
    pub async fn executemany<I, P>(
        &mut self,
        sql: impl Into<String>,
        seq_of_params: I,
    ) -> Result<&mut Self, SqlBridgeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.ensure_usable()?;
        let sql = sql.into();
        let seq: Vec<Params> = seq_of_params.into_iter().map(Into::into).collect();
        let id = self.id;
        self.description = None;
        let summary = self
            .conn
            .inner
            .worker
            .call("executemany", move |state| state.execute_many(id, &sql, &seq))
            .await?;
        self.apply(summary);
        Ok(self)
    }

    async fn fetch(&self, limit: Option<usize>) -> Result<Vec<Row>, SqlBridgeError> {
        self.ensure_usable()?;
        let id = self.id;
        let factories = self.conn.factories();
        self.conn
            .inner
            .worker
            .call("fetch", move |state| state.fetch(id, limit, factories))
            .await
    }

    /// Fetch the next row, or `None` once the result is exhausted.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] if the cursor or connection is closed.
    pub async fn fetchone(&self) -> Result<Option<Row>, SqlBridgeError> {
        Ok(self.fetch(Some(1)).await?.into_iter().next())
    }

    /// Fetch up to `size` rows (the cursor's [`arraysize`](Cursor::arraysize) when `None`).
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] if the cursor or connection is closed.
    pub async fn fetchmany(&self, size: Option<usize>) -> Result<Vec<Row>, SqlBridgeError> {
        self.fetch(Some(size.unwrap_or(self.arraysize))).await
    }

    /// Fetch every remaining row.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] if the cursor or connection is closed.
    pub async fn fetchall(&self) -> Result<Vec<Row>, SqlBridgeError> {
        self.fetch(None).await
    }

    /// Turn the cursor into a stream of its remaining rows.
    ///
    /// Each step is one fetch on the connection's queue. The stream ends after the last row or
    /// after yielding the first error, and keeps returning `None` when polled again. It cannot be
    /// restarted; dropping it early releases the cursor's buffered rows.
    pub fn into_stream(
        self,
    ) -> impl FusedStream<Item = Result<Row, SqlBridgeError>> + Send + 'static {
        stream::unfold(Some(self), |cursor| async move {
            let cursor = cursor?;
            match cursor.fetchone().await {
                Ok(Some(row)) => Some((Ok(row), Some(cursor))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
        .fuse()
    }

    /// Release the cursor's buffered rows. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::BridgeError`] only if the worker loses the request.
    pub async fn close(&mut self) -> Result<(), SqlBridgeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.conn.ensure_open().is_err() {
            // A closed connection already dropped every cursor's state.
            return Ok(());
        }
        let id = self.id;
        match self
            .conn
            .inner
            .worker
            .call("close cursor", move |state| {
                state.release_cursor(id);
                Ok(())
            })
            .await
        {
            Err(SqlBridgeError::UsageError(_)) => Ok(()),
            other => other,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The connection this cursor runs on.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Rows modified by the last `INSERT`/`UPDATE`/`DELETE`/`REPLACE` (summed for
    /// `executemany`), or `-1`.
    #[must_use]
    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    /// Rowid of the last row inserted through this cursor.
    #[must_use]
    pub fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    /// Column names of the last statement, if it returns rows.
    #[must_use]
    pub fn description(&self) -> Option<&[String]> {
        self.description.as_ref().map(Columns::names)
    }

    /// Default number of rows for [`Cursor::fetchmany`].
    #[must_use]
    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size.max(1);
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let id = self.id;
        if !self
            .conn
            .inner
            .worker
            .submit_detached("release cursor", move |state| state.release_cursor(id))
        {
            trace!(cursor_id = id, "worker already stopped; nothing to release");
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field("rowcount", &self.rowcount)
            .field("lastrowid", &self.lastrowid)
            .finish_non_exhaustive()
    }
}
