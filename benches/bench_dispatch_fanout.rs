//! Criterion measurement of fanning single-row SQLite lookups out across pools of
//! different widths. Every iteration queues the same seeded id workload and waits
//! for all completion hooks.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rusqlite::{Connection, params};
use sql_dispatch::prelude::*;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::runtime::Runtime;

const LOOKUP: &str = "SELECT id, name, score FROM test WHERE id = ?1";

/// On-disk database plus the deterministic id workload.
struct Dataset {
    _dir: TempDir,
    path: String,
    ids: Vec<i64>,
}

static DATASET: LazyLock<Dataset> = LazyLock::new(|| {
    let row_count = lookup_row_count();
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("bench_dispatch_fanout.db");
    prepare_sqlite_dataset(&path, row_count).expect("failed to prepare SQLite dataset");

    let mut ids: Vec<i64> = (1..=row_count as i64).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(1_234_567_890);
    ids.shuffle(&mut rng);

    Dataset {
        path: path.to_string_lossy().into_owned(),
        _dir: dir,
        ids,
    }
});

static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

fn lookup_row_count() -> usize {
    std::env::var("BENCH_LOOKUPS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1000)
}

fn prepare_sqlite_dataset(path: &Path, row_count: usize) -> rusqlite::Result<()> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        CREATE TABLE test (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL,
            score   REAL NOT NULL
        );
        ",
    )?;

    let transaction = conn.transaction()?;
    {
        let mut insert_stmt =
            transaction.prepare("INSERT INTO test (id, name, score) VALUES (?1, ?2, ?3)")?;
        for id in 1..=row_count as i64 {
            insert_stmt.execute(params![id, format!("name-{id}"), id as f64 * 0.5])?;
        }
    }
    transaction.commit()?;
    Ok(())
}

fn started_pool(width: usize) -> ConnectionPool {
    let pool = ConnectionPool::new();
    pool.start(
        width,
        ConnectionTarget::Sqlite(SqliteOptions::new(DATASET.path.clone())),
    )
    .expect("start pool");
    assert!(
        TOKIO_RUNTIME.block_on(pool.wait_ready(Duration::from_secs(10))),
        "pool never became ready"
    );
    pool
}

fn dispatch_fanout(c: &mut Criterion) {
    let ids = DATASET.ids.clone();
    let mut group = c.benchmark_group("sqlite_dispatch_fanout");
    group.throughput(Throughput::Elements(ids.len() as u64));

    for width in [1_usize, 2, 4, 8] {
        let pool = started_pool(width);
        group.bench_function(BenchmarkId::new("slots", width), |b| {
            b.iter_custom(|iters| {
                let mut total = Duration::default();
                for _ in 0..iters {
                    let (tx, rx) = mpsc::channel();
                    let start = Instant::now();
                    for &id in &ids {
                        let results = Results::<(i64, String, f64)>::shared();
                        let sink = Arc::clone(&results);
                        let tx = tx.clone();
                        let query = Query::new(LOOKUP, &results)
                            .parameters(Parameters::new((id,)))
                            .on_complete(move || {
                                let _ = tx.send(sink.verify());
                            });
                        assert!(pool.queue(query), "pool rejected lookup");
                    }
                    for code in rx.iter().take(ids.len()) {
                        black_box(code);
                    }
                    total += start.elapsed();
                }
                total
            });
        });
        pool.terminate().expect("terminate pool");
    }

    group.finish();
}

criterion_group!(benches, dispatch_fanout);
criterion_main!(benches);
