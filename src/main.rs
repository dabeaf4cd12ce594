/*!
 * Voicebook Backend - Voice Agent Booking Backend
 *
 * Main application entry point for the Axum-based webhook server. Brokers
 * between a stateless voice agent and the external practice-management
 * system for multi-location clinics.
 */

// Module declarations
mod cache;
mod config;
mod db;
mod handlers;
mod matcher;
mod middleware;
mod models;
mod pms;
mod routes;
mod services;
mod utils;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache::{spawn_cache_maintenance, TieredCache};
use config::Config;
use db::create_pool;
use handlers::AppState;
use pms::PmsClientFactory;
use routes::create_webhook_routes;

/// Liveness probe response
#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    commit: String,
    uptime_seconds: u64,
    database: String,
}

/// Build identity response
#[derive(Debug, Serialize, Deserialize)]
struct VersionResponse {
    name: String,
    version: String,
    commit: String,
    built_at: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Check for health check CLI flag
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 && args[1] == "--health-check" {
        return perform_health_check().await;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug,axum::rejection=trace,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Voicebook Backend...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");
    tracing::info!("Environment: {}", config.server.environment);

    // Warn if debug/trace logging is enabled in production
    let log_level = std::env::var("RUST_LOG").unwrap_or_default();
    if config.server.environment == "production"
        && (log_level.contains("debug") || log_level.contains("trace"))
    {
        tracing::warn!(
            "RUST_LOG={} in production environment — consider setting to 'info' or 'warn' \
             to avoid exposing caller phone numbers in logs",
            log_level
        );
    }

    // Create database connection pool
    let pool = create_pool(&config.database).await?;
    tracing::info!("Database connection pool created successfully");

    // Create the tiered cache
    let cache = TieredCache::new(pool.clone(), &config.cache);
    tracing::info!("Tiered cache initialized");

    // Create the PMS client factory (per-clinic credentials come from the
    // clinic records, not from configuration)
    let pms = Arc::new(PmsClientFactory::new(config.pms.clone())?);
    tracing::info!(
        "PMS client factory initialized (host: {}, per-clinic concurrency: {})",
        config.pms.host,
        config.pms.per_clinic_concurrency
    );

    // Record server start time
    let start_time = std::time::SystemTime::now();

    let config = Arc::new(config);

    // Create application state
    let app_state = AppState {
        pool: pool.clone(),
        cache: cache.clone(),
        pms: pms.clone(),
        config: config.clone(),
        start_time,
    };

    // Spawn the cache maintenance background task
    spawn_cache_maintenance(
        pool.clone(),
        pms,
        cache,
        config.cache.maintenance_interval,
    );
    tracing::info!("Cache maintenance task started");

    // Build application router
    let app = create_app(app_state, start_time);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    tracing::info!("HTTP server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Assemble the router: ops endpoints in front of the webhook surface.
/// The probe and version routes sit outside the API-key boundary so the
/// container orchestrator needs no credentials.
fn create_app(state: AppState, start_time: std::time::SystemTime) -> Router {
    // One handler serves both probe paths; the voice platform expects
    // /health, the deploy tooling /api/health
    let probe = {
        let pool = state.pool.clone();
        move || health_handler(pool.clone(), start_time)
    };

    Router::new()
        .route("/health", get(probe.clone()))
        .route("/api/health", get(probe))
        .route("/api/version", get(version_handler))
        .route("/", get(root_handler))
        .merge(create_webhook_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Service banner for anyone poking the root path
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Voicebook Backend",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Voice Agent Booking Backend for Multi-Location Clinics",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "version": "/api/version"
        }
    }))
}

/// Liveness probe. Every cache tier and the booking protocol sit on the
/// database, so reachability of the store is the one signal that matters;
/// build identity rides along for dashboards.
async fn health_handler(
    pool: sqlx::PgPool,
    started: std::time::SystemTime,
) -> impl IntoResponse {
    let database_ok = match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health probe could not reach the database");
            false
        }
    };

    let response = HealthResponse {
        status: if database_ok { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
        uptime_seconds: started.elapsed().unwrap_or_default().as_secs(),
        database: if database_ok { "connected" } else { "unreachable" }.to_string(),
    };

    let status_code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// Build identity: package version plus the git commit and timestamp
/// stamped in by build.rs
async fn version_handler() -> impl IntoResponse {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
        built_at: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown").to_string(),
    })
}

/// Perform health check for Docker healthcheck
async fn perform_health_check() -> anyhow::Result<()> {
    let port = env::var("SERVER_PORT").unwrap_or_else(|_| "8000".to_string());
    let url = format!("http://127.0.0.1:{}/health", port);

    match reqwest::Client::new().get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            println!("Health check passed");
            std::process::exit(0);
        }
        Ok(response) => {
            eprintln!("Health check failed with status: {}", response.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

// Endpoint behavior is covered by the integration tests in tests/; these
// handlers require a database connection.
