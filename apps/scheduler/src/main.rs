use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use encore_catalog_client::CatalogClient;
use encore_scheduler::config::Config;
use encore_scheduler::recordings::PgRecordingStore;
use encore_scheduler::routes::admin_router;
use encore_scheduler::store::PgTaskStore;
use encore_scheduler::{Scheduler, TaskHandlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "encore_scheduler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        environment = %config.environment(),
        log_dir = %config.log_dir.display(),
        "Starting Encore scheduler"
    );

    // Initialize database pool
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database().max_connections)
        .min_connections(config.database().min_connections)
        .acquire_timeout(Duration::from_secs(config.database().connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database().idle_timeout_secs))
        .connect(&config.database().url)
        .await?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    let catalog = CatalogClient::new(config.catalog().clone())?;
    let recordings = Arc::new(PgRecordingStore::new(pool.clone()));
    let handlers = TaskHandlers::builtin(catalog, recordings, config.batch_size);
    tracing::info!(handlers = ?handlers.ids(), "Task handlers registered");

    let store = Arc::new(PgTaskStore::new(pool.clone()));
    let scheduler = Arc::new(Scheduler::new(store, handlers, config.log_dir.clone()));
    let armed = scheduler.load_all().await?;
    tracing::info!(armed, "Scheduled tasks loaded");

    let app = admin_router(scheduler.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    pool.close().await;
    tracing::info!("Encore scheduler stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
