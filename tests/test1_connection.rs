use sqlite_bridge::prelude::*;
use sqlite_bridge::{ConnectOptions, ErrorKind};
use tempfile::tempdir;

#[tokio::test]
async fn smoke_create_insert_select() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_bridge::connect(":memory:").await?;
    assert_eq!(conn.state(), ConnectionState::Open);

    conn.executescript("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
        .await?;
    conn.execute("INSERT INTO t (name) VALUES (?1)", ["alice"]).await?;
    conn.commit().await?;
    assert_eq!(conn.total_changes(), 1);

    let rows = conn.execute_fetchall("SELECT id, name FROM t", ()).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Integer(1));
    assert_eq!(rows[0][1], Value::from("alice"));

    conn.close().await?;
    assert_eq!(conn.state(), ConnectionState::Closed);
    Ok(())
}

#[tokio::test]
async fn lifecycle_requires_open_before_use() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::new(":memory:")?;
    assert_eq!(conn.state(), ConnectionState::Unopened);

    let err = conn.execute("SELECT 1", ()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    conn.open().await?;
    let err = conn.open().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn close_is_idempotent_and_final() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_bridge::connect(":memory:").await?;
    let clone = conn.clone();

    conn.close().await?;
    conn.close().await?;
    clone.close().await?;

    let err = clone.execute("SELECT 1", ()).await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::UsageError(_)));
    assert_eq!(conn.cursor().unwrap_err().kind(), ErrorKind::Usage);
    assert_eq!(conn.open().await.unwrap_err().kind(), ErrorKind::Usage);
    Ok(())
}

#[tokio::test]
async fn closing_an_unopened_connection_stops_it() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::new(":memory:")?;
    conn.close().await?;
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert_eq!(conn.open().await.unwrap_err().kind(), ErrorKind::Usage);
    Ok(())
}

#[tokio::test]
async fn open_failure_is_a_connection_error() {
    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("missing").join("nested").join("db.sqlite");
    let err = sqlite_bridge::connect(target.as_path()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.sqlite_error().is_some());
}

#[tokio::test]
async fn invalid_options_fail_before_spawning() {
    let err = Connection::new("").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn transaction_flag_follows_implicit_begin_and_commit()
-> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_bridge::connect(":memory:").await?;
    conn.executescript("CREATE TABLE t (x INTEGER)").await?;
    assert!(!conn.in_transaction());

    conn.execute("INSERT INTO t VALUES (1)", ()).await?;
    assert!(conn.in_transaction());

    conn.commit().await?;
    assert!(!conn.in_transaction());

    conn.execute("UPDATE t SET x = 2", ()).await?;
    assert!(conn.in_transaction());
    conn.rollback().await?;
    assert!(!conn.in_transaction());

    let rows = conn.execute_fetchall("SELECT x FROM t", ()).await?;
    assert_eq!(rows[0][0], Value::Integer(1));
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn autocommit_level_never_holds_a_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let conn = ConnectOptions::builder(":memory:")
        .isolation_level(IsolationLevel::Autocommit)
        .connect()
        .await?;
    assert_eq!(conn.isolation_level(), IsolationLevel::Autocommit);

    conn.executescript("CREATE TABLE t (x INTEGER)").await?;
    conn.execute("INSERT INTO t VALUES (1)", ()).await?;
    assert!(!conn.in_transaction());

    conn.set_isolation_level(IsolationLevel::Immediate).await?;
    conn.execute("INSERT INTO t VALUES (2)", ()).await?;
    assert!(conn.in_transaction());

    // Switching back to autocommit commits what is pending.
    conn.set_isolation_level(IsolationLevel::Autocommit).await?;
    assert!(!conn.in_transaction());
    assert_eq!(conn.total_changes(), 2);
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn explicit_begin_rejects_nesting() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_bridge::connect(":memory:").await?;
    conn.begin().await?;
    assert!(conn.in_transaction());
    assert_eq!(conn.begin().await.unwrap_err().kind(), ErrorKind::Usage);
    conn.commit().await?;
    // Committing with nothing pending is a no-op.
    conn.commit().await?;
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn file_database_persists_across_connections() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("persist.db");

    let writer = sqlite_bridge::connect(path.as_path()).await?;
    writer
        .executescript("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")
        .await?;
    writer
        .execute(
            "INSERT INTO kv VALUES (:k, :v)",
            Params::named([(":k", Value::from("a")), (":v", Value::from(7))]),
        )
        .await?;
    writer.commit().await?;
    writer.close().await?;

    let reader = ConnectOptions::builder(path.to_string_lossy())
        .read_only(true)
        .connect()
        .await?;
    let rows = reader.execute_fetchall("SELECT v FROM kv WHERE k = 'a'", ()).await?;
    assert_eq!(rows[0][0], Value::Integer(7));

    let err = reader
        .execute("INSERT INTO kv VALUES ('b', 1)", ())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operational);
    reader.close().await?;
    Ok(())
}

#[tokio::test]
async fn pragmas_apply_on_open() -> Result<(), Box<dyn std::error::Error>> {
    let conn = ConnectOptions::builder(":memory:")
        .pragma("foreign_keys", "ON")
        .connect()
        .await?;
    let rows = conn.execute_fetchall("PRAGMA foreign_keys", ()).await?;
    assert_eq!(rows[0][0], Value::Integer(1));
    conn.close().await?;
    Ok(())
}
