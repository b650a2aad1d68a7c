#![cfg(feature = "test-utils")]

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use sql_dispatch::prelude::*;
use sql_dispatch::test_utils::{setup_postgres_embedded, stop_postgres_embedded};

#[test]
fn postgres_round_trip_with_inet_and_timestamp() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("dispatch_test")?;
    let options = pg.options.clone();

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async move {
        let pool = ConnectionPool::new();
        pool.start(3, ConnectionTarget::Postgres(options))?;
        if !pool.wait_ready(Duration::from_secs(10)).await {
            return Err::<(), Box<dyn std::error::Error>>("postgres pool not ready".into());
        }

        let ddl = Results::<()>::shared();
        pool.execute(Query::new(
            "CREATE TABLE visits (seen_at TIMESTAMP NOT NULL, address INET NOT NULL, note TEXT NOT NULL)",
            &ddl,
        ))
        .await?;
        assert_eq!(ddl.status(), Some(Status::CommandOk));

        let seen_at: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 30, 5))
            .ok_or("bad timestamp")?;

        let insert = Results::<()>::shared();
        pool.execute(
            Query::new(
                "INSERT INTO visits (seen_at, address, note) VALUES ($1, $2, $3)",
                &insert,
            )
            .parameters(Parameters::new((seen_at, "127.0.0.1", "abc"))),
        )
        .await?;
        assert_eq!(insert.status(), Some(Status::CommandOk));
        assert_eq!(insert.affected_rows(), 1);

        let select = Results::<(NaiveDateTime, String, String)>::shared();
        pool.execute(
            Query::new(
                "SELECT seen_at, address, note FROM visits WHERE address = $1",
                &select,
            )
            .parameters(Parameters::new(("127.0.0.1",))),
        )
        .await?;
        assert_eq!(select.verify(), 0);
        assert_eq!(select.rows(), 1);
        assert_eq!(
            *select.get(0)?,
            (seen_at, "127.0.0.1".to_string(), "abc".to_string())
        );

        let failed = Results::<(i64,)>::shared();
        pool.execute(Query::new("SELECT id FROM missing_table", &failed))
            .await?;
        assert_eq!(
            failed.status().and_then(|s| s.error_code().map(str::to_owned)),
            Some("42P01".to_string())
        );

        pool.terminate()?;
        Ok(())
    });

    stop_postgres_embedded(pg);
    outcome
}
