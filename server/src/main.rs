use axum::{Router, response::IntoResponse, routing::get};
use maskpaint_server::config::Config;
use maskpaint_server::{AppState, HttpOracle, SegmentationOracle, build_router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Ensure a directory exists, creating it if necessary
fn ensure_directory(path: &Path, name: &str) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created {} directory: {:?}", name, path);
        Ok(())
    } else if path.is_dir() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} path {:?} exists but is not a directory", name, path),
        ))
    }
}

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Periodic update of gauge metrics
async fn update_gauge_metrics(state: &AppState) {
    metrics::gauge!("maskpaint_sessions_active").set(state.sessions.session_count().await as f64);
    metrics::gauge!("maskpaint_uptime_seconds").set(state.uptime_seconds() as f64);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "maskpaint=debug,maskpaint_server=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}",
        config.host, config.port
    );
    info!(
        "Oracle endpoint: {} (remote paint {})",
        config.oracle.url,
        if config.remote_paint_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    if let Err(e) = ensure_directory(&config.results_dir, "results") {
        warn!(
            "Failed to create results directory {:?}: {}",
            config.results_dir, e
        );
    }

    let oracle: Arc<dyn SegmentationOracle> = Arc::new(HttpOracle::new(config.oracle.clone()));
    let app_state = AppState::from_config(&config, oracle);

    // Expire sessions in the background
    let session_config = app_state.sessions.config();
    info!(
        "Sessions expire {:?} after creation (sweep every {:?})",
        session_config.ttl, session_config.reaper_interval
    );
    app_state.sessions.start_reaper();

    // Periodic update of gauge metrics (every 5 seconds)
    let metrics_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            update_gauge_metrics(&metrics_state).await;
        }
    });

    let app = Router::new()
        .route("/metrics/prometheus", get(prometheus_metrics))
        .merge(build_router(app_state.clone()));

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Maskpaint server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.sessions.stop_reaper();
    info!("Server stopped");

    Ok(())
}
