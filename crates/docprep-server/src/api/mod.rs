//! HTTP surface of the ingestion service.
//!
//! Routes: the bucket-notification webhook at `/minio_event`, the item
//! lifecycle endpoints under `/api`, and the usual `/` + `/health` probes.
//! All handlers delegate to [`IngestionService`] and answer errors through
//! [`crate::error::AppError`].

pub mod events;
pub mod files;
pub mod links;
pub mod sync;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tracing::{error, info, warn};

use crate::clients::PipelineClients;
use crate::config::{Config, CorsConfig};
use crate::ingestion::IngestionService;
use crate::middleware;
use crate::pipeline::PipelineExecutor;
use crate::queue::{JobQueue, RetryPolicy};
use crate::storage::{self, ObjectStore, S3ObjectStore};
use crate::store::{self, ItemStore, PgItemStore};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestionService>,
}

/// Assemble every component and run the server until shutdown.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = store::create_pool(&config.database).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let item_store: Arc<dyn ItemStore> = Arc::new(PgItemStore::new(pool));

    let storage_config = storage::StorageConfig::from_env()?;
    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&storage_config));

    let clients = Arc::new(PipelineClients::new(config.services.clone())?);
    let executor = Arc::new(PipelineExecutor::new(
        Arc::clone(&item_store),
        Arc::clone(&objects),
        clients,
        config.pipeline.clone(),
    ));
    let queue = JobQueue::start(
        executor,
        RetryPolicy::from_config(&config.pipeline),
        config.pipeline.worker_count,
    );

    let service = Arc::new(IngestionService::new(item_store, objects, queue.clone()));

    let scheduler_shutdown = CancellationToken::new();
    spawn_sync_scheduler(
        Arc::clone(&service),
        config.pipeline.sync_interval_secs,
        scheduler_shutdown.clone(),
    );

    let state = AppState { service };
    let app = create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining job queue before exit");
    scheduler_shutdown.cancel();
    queue.shutdown().await;

    Ok(())
}

pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let api = Router::new()
        .route("/files", get(files::list_files).post(files::upload_file))
        .route(
            "/files/sync",
            get(sync::preview_sync).post(sync::apply_sync),
        )
        .route("/file/:id", get(files::get_file).delete(files::delete_file))
        .route("/file/:id/retry", post(files::retry_file))
        .route("/file/:id/task", delete(files::cancel_file))
        .route("/links", get(links::list_links).post(links::upload_link))
        .route("/link/:id", get(links::get_link).delete(links::delete_link))
        .route("/link/:id/retry", post(links::retry_link))
        .route("/link/:id/task", delete(links::cancel_link));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/minio_event", post(events::minio_event))
        .nest("/api", api)
        .layer(middleware::cors_layer(cors))
        .layer(middleware::tracing_layer())
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Periodically apply reconciliation so storage-side changes are picked up
/// even when bucket notifications are lost. Disabled when the interval is 0.
fn spawn_sync_scheduler(
    service: Arc<IngestionService>,
    interval_secs: u64,
    shutdown: CancellationToken,
) {
    if interval_secs == 0 {
        return;
    }

    tokio::spawn(async move {
        let period = Duration::from_secs(interval_secs);
        let mut ticker = tokio::time::interval(period);
        // The immediate first tick would race server startup.
        ticker.tick().await;
        info!(interval_secs, "sync scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match service.sync_apply().await {
                Ok(summary) => {
                    if summary.failed > 0 {
                        warn!(failed = summary.failed, "scheduled sync had failures");
                    }
                }
                Err(err) => error!(error = %err, "scheduled sync failed"),
            }
        }
        info!("sync scheduler stopped");
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install terminate handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Docprep Ingestion Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
