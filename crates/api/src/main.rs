use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kbase_cloud::{LocalObjectStore, S3ObjectStore};
use kbase_core::memory::MemoryCounterStore;
use kbase_core::rate_limit::{AdmissionController, CounterStore};
use kbase_core::stores::ObjectStore;
use kbase_db::{PgEntryStore, PgJobStore, RedisCounterStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kbase_api::background;
use kbase_api::config::{ServerConfig, StorageConfig};
use kbase_api::engine::{ImportEngine, Stores};
use kbase_api::generation::{ContentGenerator, HttpContentGenerator};
use kbase_api::router::build_app_router;
use kbase_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = kbase_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    kbase_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    kbase_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Object storage ---
    let objects: Arc<dyn ObjectStore> = match &config.storage {
        StorageConfig::Local {
            dir,
            public_base_url,
        } => {
            tokio::fs::create_dir_all(dir)
                .await
                .expect("Failed to create local storage directory");
            tracing::info!(dir = %dir.display(), "Using local object storage");
            Arc::new(LocalObjectStore::new(dir.clone(), public_base_url.clone()))
        }
        StorageConfig::S3 {
            bucket,
            public_base_url,
        } => {
            tracing::info!(bucket = %bucket, "Using S3 object storage");
            Arc::new(S3ObjectStore::from_env(bucket.clone(), public_base_url.clone()).await)
        }
    };

    // --- Counter store ---
    let counters: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCounterStore::connect(url)
                .await
                .expect("Failed to connect to Redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set; rate-limit counters are per-process");
            Arc::new(MemoryCounterStore::new())
        }
    };
    let admission = Arc::new(AdmissionController::new(counters, config.rate_limit.policy));

    // --- Generation backend ---
    let generator: Option<Arc<dyn ContentGenerator>> = match &config.generation {
        Some(generation) => {
            tracing::info!(api_url = %generation.api_url, model = %generation.model, "Content generation enabled");
            Some(Arc::new(
                HttpContentGenerator::new(generation.clone()).expect("Failed to build generation client"),
            ))
        }
        None => {
            tracing::info!("GENERATION_API_URL not set; /generate will answer 503");
            None
        }
    };

    // --- Import engine ---
    let stores = Stores {
        jobs: Arc::new(PgJobStore::new(pool.clone())),
        entries: Arc::new(PgEntryStore::new(pool.clone())),
        objects,
    };
    let imports = Arc::new(ImportEngine::new(stores, &config.import));
    tracing::info!(strategy = ?config.import.compensation, "Import engine ready");

    // --- Stale job reaper ---
    let reaper_cancel = CancellationToken::new();
    let reaper_handle = config.stale_job_timeout().map(|timeout| {
        tokio::spawn(background::stale_jobs::run(
            Arc::clone(&imports),
            timeout,
            reaper_cancel.clone(),
        ))
    });

    // --- App state ---
    let state = AppState {
        pool: Some(pool),
        config: Arc::new(config.clone()),
        imports,
        admission,
        generator,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    reaper_cancel.cancel();
    if let Some(handle) = reaper_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Stale job reaper stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kbase_api=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
