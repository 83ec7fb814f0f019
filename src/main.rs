use std::sync::Arc;

use chat_service::{
    config::Config,
    db,
    error::AppError,
    logging, routes,
    services::{
        media_store::{MediaStore, NullMediaStore, S3MediaStore},
        notifier::LogNotifier,
        scheduler::DeletionScheduler,
        sweeper::{spawn_expiry_sweeper, SweeperConfig},
        upload_tracker::UploadTracker,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;

    // Run embedded migrations (idempotent). Failures are fatal: the schema
    // must be in sync before the sweeper touches it.
    db::MIGRATOR
        .run(&db)
        .await
        .map_err(|e| AppError::StartServer(format!("database migrations failed: {e}")))?;

    let media: Arc<dyn MediaStore> = match cfg.s3.as_ref() {
        Some(s3) => Arc::new(S3MediaStore::new(s3).await),
        None => {
            tracing::warn!("S3_BUCKET not set; media storage disabled");
            Arc::new(NullMediaStore)
        }
    };

    let scheduler = DeletionScheduler::new(db.clone(), media.clone(), cfg.deletion_grace);
    let sweeper = spawn_expiry_sweeper(db.clone(), media.clone(), SweeperConfig::from_config(&cfg));

    let state = AppState {
        db: db.clone(),
        config: cfg.clone(),
        media,
        scheduler: scheduler.clone(),
        uploads: Arc::new(UploadTracker::new()),
        notifier: Arc::new(LogNotifier),
    };

    let app = routes::router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting chat-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    // Stop background work before exit. Grace jobs lost here are re-discovered
    // by the sweeper once the TTL elapses.
    scheduler.shutdown();
    sweeper.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
