mod error;
mod render;
mod routes;
mod session;
mod state;

use p2p_data::{config::DashboardConfig, init_logging};
use state::AppState;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    init_logging();

    let config = match DashboardConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if config.password.is_empty() {
        warn!("DASHBOARD_PASSWORD is empty, dashboard is not password protected");
    }

    let addr = config.addr;
    info!(
        source = %config.source,
        timezone = %config.timezone,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        window_days = config.window_days,
        "starting P2P dashboard"
    );

    let app = routes::router(AppState::new(config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%addr, %error, "failed to bind dashboard listener");
            return ExitCode::FAILURE;
        }
    };

    info!("Dashboard listening on http://{}", addr);

    if let Err(error) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(%error, "dashboard server failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping dashboard");
}
