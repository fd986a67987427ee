use anyhow::{Context, Result};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use shopfront_service::{
    app,
    core::{app_state::AppState, bootstrap, config, db},
    helpers::defaults,
};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    bootstrap::init_tracing();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let db_pool = db::create_pool(&config.database.url).await?;
    {
        let conn = &mut db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;
        defaults::seed_defaults(conn, config.super_admin.as_ref()).await?;
    }

    let server = config.server.clone();
    let app = app(AppState::new(db_pool, config))?;

    tracing::info!("Bootstrapping...");
    bootstrap::serve("ShopfrontService", app, &server).await
}
