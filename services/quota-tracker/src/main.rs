use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use study_quota_tracker::{create_router, ApiState, QuotaServiceConfig, QuotaTracker, SharedQuotaTracker};

#[tokio::main]
async fn main() -> Result<()> {
    let config = QuotaServiceConfig::from_env()?;
    init_tracing(&config.log_level)?;

    info!(
        addr = %config.listen_addr(),
        features = config.features.len(),
        tick_interval_ms = config.tick_interval_ms,
        "starting study quota tracker"
    );

    let tracker = QuotaTracker::from_features(&config.features)
        .context("invalid feature quota table")?
        .with_warning_threshold(config.warning_threshold_percent);
    let tracker = SharedQuotaTracker::new(tracker);

    for feature in &config.features {
        info!(
            feature = %feature.name,
            max_events = feature.max_events,
            window_ms = feature.window_ms,
            "feature quota registered"
        );
    }

    let ticker = tracker.start_ticker(Duration::from_millis(config.tick_interval_ms));

    let addr = config.listen_addr();
    let state = Arc::new(ApiState::new(tracker, config)?);
    let router = create_router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ticker.abort();
    info!("study quota tracker shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
