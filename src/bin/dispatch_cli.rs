use std::process::ExitCode;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use sql_dispatch::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fan a SQL statement out across a dispatch pool")]
struct Args {
    #[arg(long, value_enum, default_value = "sqlite")]
    db_type: DatabaseType,
    /// `SQLite` path, or a Postgres connection URL.
    #[arg(long)]
    target: String,
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Submitting threads.
    #[arg(long, default_value_t = 1)]
    threads: usize,
    /// Submissions per thread.
    #[arg(long, default_value_t = 1)]
    repeat: usize,
    #[arg(long, default_value_t = 10)]
    ready_timeout_secs: u64,
    statement: String,
}

fn connection_target(args: &Args) -> Result<ConnectionTarget, SqlDispatchError> {
    match args.db_type {
        DatabaseType::Sqlite => Ok(ConnectionTarget::Sqlite(SqliteOptions::new(
            args.target.clone(),
        ))),
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => Ok(ConnectionTarget::Postgres(PostgresOptions::from_url(
            args.target.clone(),
        ))),
        #[cfg(not(feature = "postgres"))]
        DatabaseType::Postgres => Err(SqlDispatchError::ConfigError(
            "built without postgres support".to_string(),
        )),
    }
}

struct Outcome {
    status: Option<Status>,
    rows: usize,
    affected_rows: usize,
}

async fn run(args: Args) -> Result<usize, SqlDispatchError> {
    let pool = Arc::new(ConnectionPool::new());
    pool.start(args.concurrency, connection_target(&args)?)?;
    if !pool
        .wait_ready(Duration::from_secs(args.ready_timeout_secs))
        .await
    {
        if let Err(e) = pool.terminate() {
            warn!(error = %e, "terminate after failed startup");
        }
        return Err(SqlDispatchError::NotReady(format!(
            "no connection to {} within {}s",
            args.target, args.ready_timeout_secs
        )));
    }

    let started = Instant::now();
    let (tx, rx) = mpsc::channel::<Outcome>();
    let statement: Arc<str> = Arc::from(args.statement.as_str());
    let submitters: Vec<_> = (0..args.threads)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let tx = tx.clone();
            let statement = Arc::clone(&statement);
            let repeat = args.repeat;
            thread::spawn(move || {
                let mut accepted = 0;
                for _ in 0..repeat {
                    let results = Results::<()>::shared();
                    let sink = Arc::clone(&results);
                    let tx = tx.clone();
                    let query = Query::new(Arc::clone(&statement), &results).on_complete(move || {
                        let _ = tx.send(Outcome {
                            status: sink.status(),
                            rows: sink.rows(),
                            affected_rows: sink.affected_rows(),
                        });
                    });
                    if pool.queue(query) {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();
    drop(tx);

    let accepted: usize = submitters
        .into_iter()
        .map(|handle| handle.join().unwrap_or(0))
        .sum();

    let mut failures = 0;
    for outcome in rx.iter().take(accepted) {
        match outcome.status {
            Some(status) if status.is_success() => {
                println!(
                    "{status}: rows={} affected={}",
                    outcome.rows, outcome.affected_rows
                );
            }
            Some(status) => {
                failures += 1;
                println!("{status}");
            }
            None => failures += 1,
        }
    }

    info!(
        accepted,
        failures,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "all submissions resolved"
    );
    pool.terminate()?;
    Ok(failures)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "dispatch failed");
            ExitCode::FAILURE
        }
    }
}
