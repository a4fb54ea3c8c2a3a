use axum::{Router, response::IntoResponse, routing::get};
use loadrun_server::run::{RunController, RunRegistry, StaticTokenAuthorizer};
use loadrun_server::{AppState, Config, app};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadrun=debug,loadrun_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    config.validate()?;
    info!(
        "Loaded configuration: host={}, port={}",
        config.host, config.port
    );

    let authorizer = StaticTokenAuthorizer::parse(&config.api_tokens);
    if authorizer.is_empty() {
        warn!("LOADRUN_API_TOKENS is empty - every request will be rejected");
    } else {
        info!("Loaded {} API tokens", authorizer.len());
    }

    let registry = Arc::new(RunRegistry::new(config.run.retention));
    let controller =
        RunController::new(config.run.clone(), Arc::new(authorizer), registry.clone())?;
    let app_state = AppState::new(controller);

    // Periodic cleanup for expired runs
    let cleanup_registry = registry.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_registry.cleanup_expired();
        }
    });

    // Periodic update of gauge metrics (every 5 seconds)
    let metrics_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let registry = metrics_state.controller.registry();
            metrics::gauge!("loadrun_runs_active").set(registry.active_count() as f64);
            metrics::gauge!("loadrun_uptime_seconds")
                .set(metrics_state.uptime_seconds() as f64);
        }
    });

    let app = app(app_state).merge(
        Router::new().route("/metrics/prometheus", get(prometheus_metrics)),
    );

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Loadrun server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
