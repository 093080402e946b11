use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use enphase_exporter::logging::init_logging;
use enphase_exporter::server::{build_router, shutdown_signal, AppState};
use enphase_exporter::startup::{
    authenticate_with_retry, STARTUP_ATTEMPTS, STARTUP_INITIAL_DELAY,
};
use enphase_exporter::{
    BuildInfo, ExporterConfig, ExporterMetrics, GatewayClient, ReadinessProbe, ScrapeCoordinator,
    SessionRefresher,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    let config = ExporterConfig::parse();
    init_logging(&config.log_level, config.log_format);

    let credentials = match config.credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let build = BuildInfo::default();
    info!(
        version = %build.version,
        commit = %build.commit,
        address = %credentials.address,
        serial = %credentials.serial,
        "Starting Enphase exporter"
    );

    let metrics = ExporterMetrics::new(&build).context("registering exporter metrics")?;
    let client = Arc::new(
        GatewayClient::new(credentials, metrics.clone()).context("building gateway client")?,
    );

    authenticate_with_retry(client.session(), STARTUP_ATTEMPTS, STARTUP_INITIAL_DELAY)
        .await
        .context("authenticating with gateway")?;

    let refresher = SessionRefresher::spawn(
        client.clone(),
        SessionRefresher::default_period(&client),
    );

    let app = build_router(AppState {
        coordinator: Arc::new(ScrapeCoordinator::new(client.clone(), metrics)),
        probe: ReadinessProbe::new(client),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(address = %addr, "Listening");
    info!("Metrics endpoint: http://{}/metrics", addr);

    let stop_serving = CancellationToken::new();
    let server_token = stop_serving.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            refresher.stop().await;
            return match result {
                Ok(served) => served.context("HTTP server failed"),
                Err(e) => Err::<(), _>(e).context("HTTP server task panicked"),
            };
        }
    }

    stop_serving.cancel();
    refresher.stop().await;

    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(Ok(Ok(()))) => info!("Shutdown complete"),
        Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server error during shutdown"),
        Ok(Err(e)) => warn!(error = %e, "HTTP server task ended abnormally"),
        Err(_) => {
            warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "In-flight requests did not finish in time, forcing shutdown"
            );
            server.abort();
        }
    }

    Ok(())
}
