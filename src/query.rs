use std::collections::VecDeque;

use rusqlite::Statement;

use crate::config::IsolationLevel;
use crate::error::SqlBridgeError;
use crate::params::bind_params;
use crate::results::{Columns, RawValue};
use crate::types::Params;

/// Leading keyword class of a statement, used to decide on implicit transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementKind {
    /// INSERT or REPLACE
    Insert,
    /// UPDATE or DELETE
    Modify,
    Other,
}

impl StatementKind {
    pub(crate) fn is_dml(self) -> bool {
        !matches!(self, StatementKind::Other)
    }
}

/// Classify a statement by its first keyword, skipping whitespace and comments.
pub(crate) fn classify(sql: &str) -> StatementKind {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |pos| &after[pos + 1..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |pos| &after[pos + 2..]);
        } else {
            break;
        }
    }

    let keyword: String = rest
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    match keyword.as_str() {
        "INSERT" | "REPLACE" => StatementKind::Insert,
        "UPDATE" | "DELETE" => StatementKind::Modify,
        _ => StatementKind::Other,
    }
}

/// What one execution left behind for its cursor.
#[derive(Debug, Default)]
pub(crate) struct StatementOutcome {
    pub(crate) columns: Option<Columns>,
    pub(crate) rows: VecDeque<Vec<RawValue>>,
    /// Rows modified by DML, `-1` otherwise.
    pub(crate) rowcount: i64,
    /// Set after INSERT/REPLACE only.
    pub(crate) lastrowid: Option<i64>,
}

fn begin_implicit(
    conn: &rusqlite::Connection,
    isolation: IsolationLevel,
    kind: StatementKind,
) -> Result<(), SqlBridgeError> {
    if !kind.is_dml() || !conn.is_autocommit() {
        return Ok(());
    }
    if let Some(begin) = isolation.begin_statement() {
        conn.execute_batch(begin)?;
    }
    Ok(())
}

fn changes(conn: &rusqlite::Connection) -> i64 {
    i64::try_from(conn.changes()).unwrap_or(i64::MAX)
}

fn column_names(stmt: &Statement<'_>) -> Columns {
    Columns::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    )
}

/// Step every row of an already bound statement into owned raw values.
fn collect_rows(stmt: &mut Statement<'_>) -> Result<VecDeque<Vec<RawValue>>, SqlBridgeError> {
    let col_count = stmt.column_count();
    let mut buffered = VecDeque::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            values.push(RawValue::from(row.get_ref(idx)?));
        }
        buffered.push_back(values);
    }
    Ok(buffered)
}

/// Prepare and run one statement, buffering any rows it returns.
///
/// # Errors
/// Driver failures are returned as [`SqlBridgeError::OperationalError`]; parameter mismatches
/// as [`SqlBridgeError::UsageError`].
pub(crate) fn run_statement(
    conn: &rusqlite::Connection,
    isolation: IsolationLevel,
    sql: &str,
    params: &Params,
) -> Result<StatementOutcome, SqlBridgeError> {
    let kind = classify(sql);
    let mut stmt = conn.prepare(sql)?;
    bind_params(&mut stmt, params)?;
    begin_implicit(conn, isolation, kind)?;

    let mut outcome = StatementOutcome {
        rowcount: -1,
        ..StatementOutcome::default()
    };
    if stmt.column_count() == 0 {
        stmt.raw_execute()?;
    } else {
        outcome.columns = Some(column_names(&stmt));
        outcome.rows = collect_rows(&mut stmt)?;
    }

    if kind.is_dml() {
        outcome.rowcount = changes(conn);
    }
    if kind == StatementKind::Insert {
        outcome.lastrowid = Some(conn.last_insert_rowid());
    }
    Ok(outcome)
}

/// Run one DML statement once per parameter set, preparing it only once.
///
/// Rows applied before a failing parameter set stay applied.
///
/// # Errors
/// Returns [`SqlBridgeError::UsageError`] for statements that return rows.
pub(crate) fn run_many(
    conn: &rusqlite::Connection,
    isolation: IsolationLevel,
    sql: &str,
    seq_of_params: &[Params],
) -> Result<StatementOutcome, SqlBridgeError> {
    let kind = classify(sql);
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() != 0 {
        return Err(SqlBridgeError::usage(
            "executemany() can only run statements that return no rows",
        ));
    }
    begin_implicit(conn, isolation, kind)?;

    let mut total: i64 = 0;
    for params in seq_of_params {
        bind_params(&mut stmt, params)?;
        let affected = stmt.raw_execute()?;
        total = total.saturating_add(i64::try_from(affected).unwrap_or(i64::MAX));
    }

    Ok(StatementOutcome {
        rowcount: if kind.is_dml() { total } else { -1 },
        lastrowid: (kind == StatementKind::Insert).then(|| conn.last_insert_rowid()),
        ..StatementOutcome::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_leading_keyword() {
        assert_eq!(classify("insert into t values (1)"), StatementKind::Insert);
        assert_eq!(classify("  REPLACE INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(classify("update t set k = 1"), StatementKind::Modify);
        assert_eq!(classify("\n\tDelete from t"), StatementKind::Modify);
        assert_eq!(classify("select * from t"), StatementKind::Other);
        assert_eq!(classify("create table t (i)"), StatementKind::Other);
        assert_eq!(classify(""), StatementKind::Other);
    }

    #[test]
    fn skips_comments_before_keyword() {
        assert_eq!(
            classify("-- add a row\n/* really */ INSERT INTO t VALUES (1)"),
            StatementKind::Insert
        );
        assert_eq!(classify("/* unterminated"), StatementKind::Other);
    }

    #[test]
    fn insert_opens_implicit_transaction() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (i INTEGER PRIMARY KEY, k INTEGER)")
            .unwrap();
        let out = run_statement(
            &conn,
            IsolationLevel::Deferred,
            "INSERT INTO t (k) VALUES (?)",
            &Params::from([5]),
        )
        .unwrap();
        assert_eq!(out.rowcount, 1);
        assert_eq!(out.lastrowid, Some(1));
        assert!(!conn.is_autocommit());
    }

    #[test]
    fn autocommit_level_leaves_no_transaction() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k INTEGER)").unwrap();
        run_statement(
            &conn,
            IsolationLevel::Autocommit,
            "INSERT INTO t VALUES (1)",
            &Params::None,
        )
        .unwrap();
        assert!(conn.is_autocommit());
    }

    #[test]
    fn select_buffers_rows_with_negative_rowcount() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let out = run_statement(
            &conn,
            IsolationLevel::Deferred,
            "SELECT 1 AS a, 'x' AS b UNION ALL SELECT 2, 'y'",
            &Params::None,
        )
        .unwrap();
        assert_eq!(out.rowcount, -1);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.columns.unwrap().names(), ["a", "b"]);
        assert_eq!(out.rows[1][1], RawValue::Text(b"y".to_vec()));
    }

    #[test]
    fn run_many_sums_rowcount_and_rejects_queries() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k INTEGER)").unwrap();
        let seq: Vec<Params> = (0..4).map(|i| Params::from([i])).collect();
        let out = run_many(&conn, IsolationLevel::Deferred, "INSERT INTO t VALUES (?)", &seq)
            .unwrap();
        assert_eq!(out.rowcount, 4);

        let err = run_many(&conn, IsolationLevel::Deferred, "SELECT ?", &seq).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
    }
}
