use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use tracing::warn;

use crate::config::{ConnectOptions, IsolationLevel};
use crate::error::SqlBridgeError;
use crate::query::{self, StatementOutcome};
use crate::results::{Columns, Factories, RawValue, Row, materialize};
use crate::types::Params;

pub(crate) type CursorId = u64;

/// Driver status the worker publishes for synchronous reads on caller threads.
#[derive(Debug, Default)]
pub(crate) struct SharedProperties {
    total_changes: AtomicU64,
    in_transaction: AtomicBool,
    isolation_level: AtomicU8,
}

impl SharedProperties {
    pub(crate) fn new(isolation_level: IsolationLevel) -> Self {
        Self {
            total_changes: AtomicU64::new(0),
            in_transaction: AtomicBool::new(false),
            isolation_level: AtomicU8::new(isolation_level.as_u8()),
        }
    }

    pub(crate) fn total_changes(&self) -> u64 {
        self.total_changes.load(Ordering::SeqCst)
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    pub(crate) fn isolation_level(&self) -> IsolationLevel {
        IsolationLevel::from_u8(self.isolation_level.load(Ordering::SeqCst))
    }
}

/// What a caller-side cursor learns from one execute.
#[derive(Debug, Clone)]
pub(crate) struct ExecuteSummary {
    pub(crate) description: Option<Columns>,
    pub(crate) rowcount: i64,
    pub(crate) lastrowid: Option<i64>,
}

struct CursorState {
    columns: Columns,
    pending: VecDeque<Vec<RawValue>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unopened,
    Open,
    Closed,
}

/// Everything only the worker thread may touch: the driver handle and buffered result sets.
pub(crate) struct WorkerState {
    conn: Option<rusqlite::Connection>,
    phase: Phase,
    isolation_level: IsolationLevel,
    cursors: HashMap<CursorId, CursorState>,
    props: Arc<SharedProperties>,
}

impl WorkerState {
    pub(crate) fn new(props: Arc<SharedProperties>) -> Self {
        Self {
            conn: None,
            phase: Phase::Unopened,
            isolation_level: props.isolation_level(),
            cursors: HashMap::new(),
            props,
        }
    }

    fn conn(&self) -> Result<&rusqlite::Connection, SqlBridgeError> {
        match (self.phase, self.conn.as_ref()) {
            (Phase::Open, Some(conn)) => Ok(conn),
            (Phase::Unopened, _) => Err(SqlBridgeError::usage("connection not opened")),
            _ => Err(SqlBridgeError::closed()),
        }
    }

    /// Open the driver handle and apply the configured busy timeout and pragmas.
    pub(crate) fn open(
        &mut self,
        options: &ConnectOptions,
    ) -> Result<rusqlite::InterruptHandle, SqlBridgeError> {
        match self.phase {
            Phase::Open => return Err(SqlBridgeError::usage("connection already open")),
            Phase::Closed => return Err(SqlBridgeError::closed()),
            Phase::Unopened => {}
        }

        let open_error = |source| SqlBridgeError::OpenError {
            target: options.target.clone(),
            source,
        };
        let conn = rusqlite::Connection::open_with_flags(&options.target, options.open_flags())
            .map_err(open_error)?;
        conn.busy_timeout(options.busy_timeout).map_err(open_error)?;
        for (name, value) in &options.pragmas {
            conn.pragma_update(None, name.as_str(), value.as_str())
                .map_err(open_error)?;
        }

        let interrupt = conn.get_interrupt_handle();
        self.conn = Some(conn);
        self.phase = Phase::Open;
        self.publish();
        Ok(interrupt)
    }

    /// Close the driver handle; every cursor's buffered rows go with it.
    pub(crate) fn close(&mut self) -> Result<(), SqlBridgeError> {
        self.phase = Phase::Closed;
        self.cursors.clear();
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_conn, err)| {
                SqlBridgeError::ConnectionError(format!("failed to close SQLite handle: {err}"))
            }),
            None => Ok(()),
        }
    }

    /// Refresh `total_changes` and `in_transaction` from the driver.
    ///
    /// Failures are logged, never returned: the command that triggered the refresh already has
    /// its own outcome.
    pub(crate) fn publish(&self) {
        let Ok(conn) = self.conn() else {
            return;
        };
        match conn.query_row("SELECT total_changes()", [], |row| row.get::<_, i64>(0)) {
            Ok(total) => {
                let total = u64::try_from(total).unwrap_or(0);
                self.props.total_changes.fetch_max(total, Ordering::SeqCst);
            }
            Err(err) => warn!(error = %err, "failed to refresh total_changes"),
        }
        self.props
            .in_transaction
            .store(!conn.is_autocommit(), Ordering::SeqCst);
    }

    pub(crate) fn execute(
        &mut self,
        cursor: CursorId,
        sql: &str,
        params: &Params,
    ) -> Result<ExecuteSummary, SqlBridgeError> {
        self.cursors.remove(&cursor);
        let result = query::run_statement(self.conn()?, self.isolation_level, sql, params);
        self.publish();
        Ok(self.store_outcome(cursor, result?))
    }

    pub(crate) fn execute_many(
        &mut self,
        cursor: CursorId,
        sql: &str,
        seq_of_params: &[Params],
    ) -> Result<ExecuteSummary, SqlBridgeError> {
        self.cursors.remove(&cursor);
        let result = query::run_many(self.conn()?, self.isolation_level, sql, seq_of_params);
        self.publish();
        Ok(self.store_outcome(cursor, result?))
    }

    fn store_outcome(&mut self, cursor: CursorId, outcome: StatementOutcome) -> ExecuteSummary {
        let summary = ExecuteSummary {
            description: outcome.columns.clone(),
            rowcount: outcome.rowcount,
            lastrowid: outcome.lastrowid,
        };
        if let Some(columns) = outcome.columns {
            self.cursors.insert(
                cursor,
                CursorState {
                    columns,
                    pending: outcome.rows,
                },
            );
        }
        summary
    }

    /// Take up to `limit` buffered rows (all when `None`) and shape them with `factories`.
    pub(crate) fn fetch(
        &mut self,
        cursor: CursorId,
        limit: Option<usize>,
        factories: Factories,
    ) -> Result<Vec<Row>, SqlBridgeError> {
        self.conn()?;
        let Some(state) = self.cursors.get_mut(&cursor) else {
            return Ok(Vec::new());
        };
        let take = limit.map_or(state.pending.len(), |n| n.min(state.pending.len()));
        // Rows leave the buffer only once the whole batch decoded, so a retry with another
        // text factory still sees them.
        let rows = state
            .pending
            .iter()
            .take(take)
            .map(|raw| materialize(factories, &state.columns, raw))
            .collect::<Result<Vec<_>, _>>()?;
        state.pending.drain(..rows.len());
        if state.pending.is_empty() {
            self.cursors.remove(&cursor);
        }
        Ok(rows)
    }

    pub(crate) fn release_cursor(&mut self, cursor: CursorId) {
        self.cursors.remove(&cursor);
    }

    /// Cursors that still hold buffered rows.
    #[cfg(test)]
    pub(crate) fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    /// Commit any pending transaction, then run a batch of statements.
    pub(crate) fn execute_script(&mut self, sql: &str) -> Result<(), SqlBridgeError> {
        let conn = self.conn()?;
        let result = (|| -> Result<(), SqlBridgeError> {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
            conn.execute_batch(sql)?;
            Ok(())
        })();
        self.publish();
        result
    }

    /// Start an explicit transaction at the connection's isolation level.
    ///
    /// With `join_active`, an already open transaction is kept instead of being an error.
    pub(crate) fn begin(&mut self, join_active: bool) -> Result<(), SqlBridgeError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            if join_active {
                return Ok(());
            }
            return Err(SqlBridgeError::usage("transaction already active"));
        }
        let begin = self.isolation_level.begin_statement().unwrap_or("BEGIN");
        let result = conn.execute_batch(begin).map_err(SqlBridgeError::from);
        self.publish();
        result
    }

    pub(crate) fn commit(&mut self) -> Result<(), SqlBridgeError> {
        self.finish_transaction("COMMIT")
    }

    pub(crate) fn rollback(&mut self) -> Result<(), SqlBridgeError> {
        self.finish_transaction("ROLLBACK")
    }

    fn finish_transaction(&mut self, statement: &str) -> Result<(), SqlBridgeError> {
        let conn = self.conn()?;
        let result = if conn.is_autocommit() {
            Ok(())
        } else {
            conn.execute_batch(statement).map_err(SqlBridgeError::from)
        };
        self.publish();
        result
    }

    /// Switch the implicit-transaction policy; switching to autocommit commits first.
    pub(crate) fn set_isolation_level(
        &mut self,
        level: IsolationLevel,
    ) -> Result<(), SqlBridgeError> {
        let conn = self.conn()?;
        if level == IsolationLevel::Autocommit && !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        self.isolation_level = level;
        self.props
            .isolation_level
            .store(level.as_u8(), Ordering::SeqCst);
        self.publish();
        Ok(())
    }

    pub(crate) fn with_connection<F, R>(&mut self, func: F) -> Result<R, SqlBridgeError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlBridgeError>,
    {
        self.conn()?;
        let conn = self.conn.as_mut().ok_or_else(SqlBridgeError::closed)?;
        let result = func(conn);
        self.publish();
        result
    }
}
