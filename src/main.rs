use std::path::PathBuf;

use opentelemetry::global;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Export traces and logs only when a collector is configured.
    let otlp = std::env::var(OTLP_ENDPOINT).ok();
    let logging = match &otlp {
        Some(endpoint) => {
            global::set_tracer_provider(oauth::telemetry::setup_tracer(
                endpoint,
            )?);
            Some(oauth::telemetry::setup_logging(endpoint)?)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(fmt::layer())
        .with(logging)
        .init();

    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => oauth::config::Configuration::default().path(PathBuf::from(path)),
        Err(_) => oauth::config::Configuration::default(),
    }
    .read()?;

    let metrics = oauth::telemetry::setup_metrics_recorder()?;
    let state = oauth::initialize_state(config.clone())
        .await?
        .with_metrics(metrics);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(
        name = %config.name,
        version = %config.version,
        port = config.port,
        "server listening"
    );

    axum::serve(listener, oauth::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to install signal handler")
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
