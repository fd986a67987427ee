use anyhow::{Context, Result, anyhow};
use diesel::{Connection, PgConnection};
use diesel_async::{
    AsyncPgConnection,
    pooled_connection::{AsyncDieselConnectionManager, bb8},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};

pub type DbPool = bb8::Pool<AsyncPgConnection>;

pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    bb8::Pool::builder()
        .build(manager)
        .await
        .context("Failed to build the DB connection pool")
}

/// Applies pending migrations on a blocking thread, returning how many ran.
pub async fn run_migrations_blocking(
    migrations: EmbeddedMigrations,
    database_url: &str,
) -> Result<usize> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&database_url)
            .context("Failed to connect for migrations")?;
        let applied = conn
            .run_pending_migrations(migrations)
            .map_err(|err| anyhow!("Failed to run migrations: {err}"))?;
        Ok(applied.len())
    })
    .await
    .context("Migration task panicked")?
}
