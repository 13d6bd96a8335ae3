//! Volume Orchestrator
//!
//! Provisions, tracks, and deletes volumes across a fleet of storage
//! backends. The binary wires the orchestrator core to a REST
//! frontend, a health endpoint, and a Prometheus metrics endpoint.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volume_orchestrator::persistence::{FileStore, MemoryStore, PersistentStore};
use volume_orchestrator::{ApiServer, ApiServerConfig, Error, Orchestrator, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Volume Orchestrator - Unified Storage Control Plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Path of the JSON persistent store; omit for an in-memory store
    #[arg(long, env = "STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Volume Orchestrator");
    info!("  Version: {}", volume_orchestrator::VERSION);
    info!("  REST API: {}", args.api_addr);
    match &args.store_path {
        Some(path) => info!("  Store: {}", path.display()),
        None => info!("  Store: in-memory (state will not survive restarts)"),
    }

    let store: Arc<dyn PersistentStore> = match &args.store_path {
        Some(path) => Arc::new(FileStore::open(path).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let orchestrator = Orchestrator::new(store);

    // Rebuild the catalog and roll back unfinished transactions before
    // any frontend is served.
    orchestrator.bootstrap().await?;

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(err) = run_health_server(&health_addr).await {
            error!("Health server error: {}", err);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(err) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", err);
        }
    });

    // Create and run the REST API server
    let api_config = ApiServerConfig {
        rest_addr: args
            .api_addr
            .parse()
            .map_err(|err| Error::Configuration(format!("invalid REST API address: {err}")))?,
    };
    let api_server = ApiServer::new(api_config, orchestrator.clone());
    orchestrator.add_frontend(api_server.clone()).await;

    info!("Starting REST API server");
    api_server.run().await?;

    info!("Orchestrator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "axum=info"] {
        if let Ok(parsed) = directive.parse() {
            filter = filter.add_directive(parsed);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use axum::{routing::get, Router};

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/livez", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }));

    let addr: SocketAddr = addr
        .parse()
        .map_err(|err| Error::Configuration(format!("invalid health server address: {err}")))?;

    info!("Health server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|err| Error::Internal(format!("health server error: {err}")))?;
    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use axum::{http::header::CONTENT_TYPE, routing::get, Router};
    use prometheus::{Encoder, TextEncoder};

    // Register orchestrator metrics
    let _ = prometheus::register_gauge!(
        "volume_orchestrator_backends_online",
        "Number of online backends"
    );
    let _ = prometheus::register_counter!(
        "volume_orchestrator_volumes_created_total",
        "Total number of volumes created"
    );
    let _ = prometheus::register_counter!(
        "volume_orchestrator_volumes_deleted_total",
        "Total number of volumes deleted"
    );
    let _ = prometheus::register_histogram!(
        "volume_orchestrator_provision_duration_seconds",
        "Duration of volume provisioning operations"
    );

    let app = Router::new().route(
        "/metrics",
        get(|| async {
            let encoder = TextEncoder::new();
            let metric_families = prometheus::gather();
            let mut buffer = Vec::new();
            if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
                error!("Failed to encode metrics: {}", err);
            }
            ([(CONTENT_TYPE, encoder.format_type().to_string())], buffer)
        }),
    );

    let addr: SocketAddr = addr
        .parse()
        .map_err(|err| Error::Configuration(format!("invalid metrics server address: {err}")))?;

    info!("Metrics server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|err| Error::Internal(format!("metrics server error: {err}")))?;
    Ok(())
}
