use postgresql_embedded::PostgreSQL;
use tokio::runtime::Runtime;

use crate::backend::Connector;
use crate::postgres::{PostgresConnector, PostgresOptions};

/// A running embedded `PostgreSQL` instance and the options that reach it.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub options: PostgresOptions,
    runtime: Runtime,
}

/// Download (bundled), start and provision an embedded `PostgreSQL` with database
/// `dbname`, then check that a [`PostgresConnector`] can reach it.
///
/// # Errors
/// Returns an error if the server cannot be set up or started, the database cannot
/// be created, or the connectivity check fails.
pub fn setup_postgres_embedded(
    dbname: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let runtime = Runtime::new()?;
    let (postgresql, options) = runtime.block_on(async {
        let mut postgresql = PostgreSQL::default();
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(dbname).await?;

        let settings = postgresql.settings();
        let options = PostgresOptions::builder()
            .host(settings.host.clone())
            .port(settings.port)
            .dbname(dbname)
            .user(settings.username.clone())
            .password(settings.password.clone())
            .finish();

        let connector = PostgresConnector::new(&options)?;
        let mut conn = connector.connect().await?;
        conn.execute("SELECT 1", &[])
            .await
            .map_err(|e| format!("embedded postgres check failed: {e:?}"))?;

        Ok::<_, Box<dyn std::error::Error>>((postgresql, options))
    })?;

    let port = postgresql.settings().port;
    Ok(EmbeddedPostgres {
        postgresql,
        port,
        options,
        runtime,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres {
        postgresql,
        runtime,
        ..
    } = postgres;
    runtime.block_on(async move {
        let _ = postgresql.stop().await;
    });
}
