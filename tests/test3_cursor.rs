use futures_util::StreamExt;
use sqlite_bridge::ErrorKind;
use sqlite_bridge::prelude::*;

async fn seeded(rows: i64) -> Result<Connection, SqlBridgeError> {
    let conn = sqlite_bridge::connect(":memory:").await?;
    conn.executescript("CREATE TABLE nums (id INTEGER PRIMARY KEY, n INTEGER NOT NULL)")
        .await?;
    conn.executemany(
        "INSERT INTO nums (n) VALUES (?)",
        (0..rows).map(|n| [n * 10]),
    )
    .await?;
    conn.commit().await?;
    Ok(conn)
}

#[tokio::test]
async fn fetch_variants_walk_forward() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(6).await?;
    let mut cursor = conn.cursor()?;
    cursor.execute("SELECT n FROM nums ORDER BY id", ()).await?;
    assert_eq!(cursor.description(), Some(&["n".to_string()][..]));
    assert_eq!(cursor.rowcount(), -1);

    let first = cursor.fetchone().await?.expect("first row");
    assert_eq!(first[0], Value::Integer(0));

    assert_eq!(cursor.fetchmany(None).await?.len(), 1);
    cursor.set_arraysize(2);
    assert_eq!(cursor.fetchmany(None).await?.len(), 2);
    assert_eq!(cursor.fetchmany(Some(10)).await?.len(), 2);

    assert!(cursor.fetchone().await?.is_none());
    assert!(cursor.fetchall().await?.is_empty());

    cursor.close().await?;
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn dml_reports_rowcount_and_lastrowid() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(3).await?;
    let mut cursor = conn.cursor()?;

    cursor.execute("INSERT INTO nums (n) VALUES (99)", ()).await?;
    assert_eq!(cursor.rowcount(), 1);
    assert_eq!(cursor.lastrowid(), Some(4));
    assert!(cursor.description().is_none());

    cursor.execute("UPDATE nums SET n = n + 1 WHERE n < 50", ()).await?;
    assert_eq!(cursor.rowcount(), 3);
    assert_eq!(cursor.lastrowid(), Some(4));

    cursor
        .executemany("DELETE FROM nums WHERE id = ?", [[1], [2], [42]])
        .await?;
    assert_eq!(cursor.rowcount(), 2);

    let rowid = conn
        .execute_insert("INSERT INTO nums (n) VALUES (?)", [7])
        .await?;
    assert_eq!(rowid, 5);

    let err = conn.execute_insert("SELECT 1", ()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn executemany_rejects_row_returning_statements() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(1).await?;
    let err = conn
        .executemany("SELECT n FROM nums WHERE id = ?", [[1], [2]])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn reexecute_discards_unread_rows() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(5).await?;
    let mut cursor = conn.cursor()?;
    cursor.execute("SELECT n FROM nums", ()).await?;
    cursor.fetchone().await?;

    cursor.execute("SELECT 'other'", ()).await?;
    let rows = cursor.fetchall().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::from("other"));
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn stream_yields_every_row_then_ends() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(25).await?;
    let cursor = conn.execute("SELECT n FROM nums ORDER BY id", ()).await?;
    let rows: Vec<Row> = cursor
        .into_stream()
        .map(|row| row.expect("row"))
        .collect()
        .await;
    assert_eq!(rows.len(), 25);
    assert_eq!(rows[24][0], Value::Integer(240));

    let empty = conn.execute("SELECT n FROM nums WHERE n < 0", ()).await?;
    let mut stream = Box::pin(empty.into_stream());
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn dropping_a_stream_early_leaves_the_connection_usable()
-> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(10).await?;
    {
        let cursor = conn.execute("SELECT n FROM nums", ()).await?;
        let mut stream = Box::pin(cursor.into_stream());
        for _ in 0..3 {
            stream.next().await.expect("row")?;
        }
    }
    let rows = conn.execute_fetchall("SELECT count(*) FROM nums", ()).await?;
    assert_eq!(rows[0][0], Value::Integer(10));
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn stream_ends_after_its_first_error() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(3).await?;
    let cursor = conn.execute("SELECT n FROM nums", ()).await?;
    let mut stream = Box::pin(cursor.into_stream());
    stream.next().await.expect("row")?;

    conn.close().await?;
    let err = stream.next().await.expect("error item").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(stream.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn closed_cursor_refuses_work() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(2).await?;
    let mut cursor = conn.execute("SELECT n FROM nums", ()).await?;
    cursor.close().await?;
    cursor.close().await?;
    assert!(cursor.is_closed());

    assert_eq!(cursor.fetchone().await.unwrap_err().kind(), ErrorKind::Usage);
    assert_eq!(
        cursor.execute("SELECT 1", ()).await.unwrap_err().kind(),
        ErrorKind::Usage
    );

    // Closing a cursor after its connection is a no-op too.
    let mut late = conn.cursor()?;
    conn.close().await?;
    late.close().await?;
    Ok(())
}

#[tokio::test]
async fn cursors_keep_separate_results() -> Result<(), Box<dyn std::error::Error>> {
    let conn = seeded(4).await?;
    let a = conn.execute("SELECT n FROM nums ORDER BY id", ()).await?;
    let b = conn
        .execute("SELECT n FROM nums ORDER BY id DESC", ())
        .await?;

    assert_eq!(a.fetchone().await?.expect("a")[0], Value::Integer(0));
    assert_eq!(b.fetchone().await?.expect("b")[0], Value::Integer(30));
    assert_eq!(a.fetchall().await?.len(), 3);
    assert_eq!(b.fetchall().await?.len(), 3);
    conn.close().await?;
    Ok(())
}
