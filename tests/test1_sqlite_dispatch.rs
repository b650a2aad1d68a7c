#![cfg(feature = "sqlite")]

use std::sync::{Arc, mpsc};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use sql_dispatch::prelude::*;
use tempfile::TempDir;

async fn sqlite_pool(dir: &TempDir, slots: usize) -> Result<ConnectionPool, SqlDispatchError> {
    let path = dir.path().join("dispatch.db");
    let pool = ConnectionPool::new();
    pool.start(
        slots,
        ConnectionTarget::Sqlite(SqliteOptions::new(path.to_string_lossy().into_owned())),
    )?;
    if !pool.wait_ready(Duration::from_secs(5)).await {
        return Err(SqlDispatchError::NotReady("sqlite pool".to_string()));
    }
    Ok(pool)
}

fn sample_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| d.and_hms_opt(14, 30, 5))
        .unwrap()
}

#[tokio::test(flavor = "current_thread")]
async fn insert_then_select_by_address() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pool = sqlite_pool(&dir, 2).await?;

    let ddl = Results::<()>::shared();
    pool.execute(Query::new(
        "CREATE TABLE visits (seen_at TIMESTAMP NOT NULL, address TEXT NOT NULL, note TEXT NOT NULL)",
        &ddl,
    ))
    .await?;
    assert_eq!(ddl.status(), Some(Status::CommandOk));

    let insert = Results::<()>::shared();
    pool.execute(
        Query::new(
            "INSERT INTO visits (seen_at, address, note) VALUES (?1, ?2, ?3)",
            &insert,
        )
        .parameters(Parameters::new((sample_time(), "127.0.0.1", "abc"))),
    )
    .await?;
    assert_eq!(insert.status(), Some(Status::CommandOk));
    assert_eq!(insert.affected_rows(), 1);

    let select = Results::<(NaiveDateTime, String, String)>::shared();
    pool.execute(
        Query::new(
            "SELECT seen_at, address, note FROM visits WHERE address = ?1",
            &select,
        )
        .parameters(Parameters::new(("127.0.0.1",))),
    )
    .await?;

    assert_eq!(select.status(), Some(Status::RowsOk));
    assert_eq!(select.verify(), 0);
    assert_eq!(select.rows(), 1);
    let row = select.get(0)?;
    assert_eq!(
        *row,
        (sample_time(), "127.0.0.1".to_string(), "abc".to_string())
    );
    assert!(matches!(
        select.get(1),
        Err(SqlDispatchError::RowOutOfRange { index: 1, rows: 1 })
    ));

    pool.terminate()?;
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn declared_columns_against_command_is_count_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pool = sqlite_pool(&dir, 1).await?;

    let results = Results::<(i64, String)>::shared();
    pool.execute(Query::new("CREATE TABLE t (id INTEGER, name TEXT)", &results))
        .await?;
    assert_eq!(results.status(), Some(Status::CommandOk));
    assert_eq!(results.verify(), -1);
    assert!(matches!(
        results.get(0),
        Err(SqlDispatchError::InvalidState(_))
    ));

    let wrong = Results::<(i64, i64)>::shared();
    pool.execute(Query::new("SELECT 1 AS id, 'x' AS name", &wrong))
        .await?;
    assert_eq!(wrong.verify(), 2);
    assert_eq!(wrong.verify(), 2);

    pool.terminate()?;
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn backend_errors_surface_in_status() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pool = sqlite_pool(&dir, 1).await?;

    let results = Results::<(i64,)>::shared();
    pool.execute(Query::new("SELECT id FROM no_such_table", &results))
        .await?;
    let status = results.status().ok_or("missing status")?;
    assert!(!status.is_success());
    assert!(status.error_code().is_some());

    // The slot survives a statement error.
    let ok = Results::<(i64,)>::shared();
    pool.execute(Query::new("SELECT 41 + 1", &ok)).await?;
    assert_eq!(ok.verify(), 0);
    assert_eq!(ok.get(0)?.0, 42);

    pool.terminate()?;
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_submitters_each_get_one_completion() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pool = Arc::new(sqlite_pool(&dir, 4).await?);

    let setup = Results::<()>::shared();
    pool.execute(Query::new(
        "CREATE TABLE hits (thread INTEGER NOT NULL)",
        &setup,
    ))
    .await?;

    let threads = 8_i64;
    let (tx, rx) = mpsc::channel();
    let handles: Vec<_> = (0..threads)
        .map(|n| {
            let pool = Arc::clone(&pool);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let results = Results::<()>::shared();
                let sink = Arc::clone(&results);
                let query = Query::new("INSERT INTO hits (thread) VALUES (?1)", &results)
                    .parameters(Parameters::new((n,)))
                    .on_complete(move || {
                        tx.send(sink.status()).unwrap();
                    });
                pool.queue(query)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    drop(tx);

    let statuses: Vec<_> = rx.iter().take(8).collect();
    assert_eq!(statuses.len(), 8);
    assert!(statuses.iter().all(|s| s.as_ref().is_some_and(Status::is_success)));

    let count = Results::<(i64,)>::shared();
    pool.execute(Query::new("SELECT COUNT(*) FROM hits", &count))
        .await?;
    assert_eq!(count.verify(), 0);
    assert_eq!(count.get(0)?.0, threads);

    pool.terminate()?;
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn results_can_be_reused_after_completion() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pool = sqlite_pool(&dir, 1).await?;

    let results = Results::<(i64,)>::shared();
    pool.execute(Query::new("SELECT 1", &results)).await?;
    assert_eq!(results.verify(), 0);
    assert_eq!(results.get(0)?.0, 1);

    pool.execute(
        Query::new("SELECT ?1", &results).parameters(Parameters::new((7_i64,))),
    )
    .await?;
    assert_eq!(results.verify(), 0);
    assert_eq!(results.get(0)?.0, 7);

    pool.terminate()?;
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn pool_config_from_json_starts() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("configured.db");
    let json = serde_json::json!({
        "target": {"db_type": "sqlite", "db_path": path.to_string_lossy()},
        "max_concurrency": 2,
        "drain_timeout_ms": 1000
    })
    .to_string();
    let config = PoolConfig::from_json_str(&json)?;

    let pool = ConnectionPool::new();
    pool.start_with(config.options(), config.target.connector()?)?;
    assert!(pool.wait_ready(Duration::from_secs(5)).await);
    assert_eq!(pool.stats().slots, 2);
    pool.terminate()?;
    Ok(())
}

const SLOW_COUNT: &str = "SELECT max(x) FROM (WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL \
     SELECT x + 1 FROM c WHERE x < 8000000) SELECT x FROM c)";

async fn wait_busy(pool: &ConnectionPool, busy: usize) -> Result<(), Box<dyn std::error::Error>> {
    for _ in 0..200 {
        if pool.stats().busy >= busy {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Err("slot never became busy".into())
}

#[tokio::test(flavor = "current_thread")]
async fn terminate_rolls_back_statement_still_running() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("abort.db");
    let count_rows = || -> Result<i64, rusqlite::Error> {
        let conn = rusqlite::Connection::open(&path)?;
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
    };
    rusqlite::Connection::open(&path)?.execute("CREATE TABLE t (x INTEGER)", [])?;

    let pool = ConnectionPool::new();
    pool.start_with(
        PoolOptions::new(1).drain_timeout(Duration::from_millis(100)),
        ConnectionTarget::Sqlite(SqliteOptions::new(path.to_string_lossy().into_owned()))
            .connector()?,
    )?;
    assert!(pool.wait_ready(Duration::from_secs(5)).await);

    let insert = Results::<()>::shared();
    assert!(pool.queue(Query::new(format!("INSERT INTO t {SLOW_COUNT}"), &insert)));
    wait_busy(&pool, 1).await?;
    pool.terminate()?;

    assert!(matches!(
        insert.status(),
        Some(Status::ConnectionError { .. })
    ));
    assert_eq!(count_rows()?, 0);

    // Long enough for the uninterrupted insert to have committed.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(count_rows()?, 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn memory_database_is_shared_by_every_slot() -> Result<(), Box<dyn std::error::Error>> {
    let pool = ConnectionPool::new();
    pool.start(2, ConnectionTarget::Sqlite(SqliteOptions::new(":memory:".into())))?;
    assert!(pool.wait_ready(Duration::from_secs(5)).await);

    let ddl = Results::<()>::shared();
    pool.execute(Query::new("CREATE TABLE t (x INTEGER)", &ddl)).await?;
    assert_eq!(ddl.status(), Some(Status::CommandOk));

    // Keep one slot busy so the count runs on the other connection.
    let slow = Results::<(i64,)>::shared();
    assert!(pool.queue(Query::new(SLOW_COUNT, &slow)));
    wait_busy(&pool, 1).await?;

    let count = Results::<(i64,)>::shared();
    pool.execute(Query::new("SELECT COUNT(*) FROM t", &count)).await?;
    assert_eq!(count.status(), Some(Status::RowsOk));
    assert_eq!(count.get(0)?.0, 0);

    pool.terminate()?;
    Ok(())
}
