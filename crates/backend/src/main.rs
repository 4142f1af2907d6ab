pub mod api;
pub mod dashboards;
pub mod routes;
pub mod shared;
pub mod system;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use dashboards::d402_mp_overview::refresher::DashboardRefresher;
use dashboards::d402_mp_overview::service::{self, DashboardService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env необязателен
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    let log_file = system::tracing::initialize()?;
    tracing::info!("Logging to {}", log_file.display());
    if dotenv_loaded {
        tracing::info!("Environment overrides loaded from .env");
    }

    let config = shared::config::load_config()?;
    let tz = config.dashboard.timezone()?;

    let dashboard = Arc::new(DashboardService::from_config(&config)?);
    service::install(dashboard.clone())?;

    let refresh_interval = config.dashboard.refresh_interval_seconds;
    if refresh_interval > 0 {
        let refresher = DashboardRefresher::new(dashboard, refresh_interval);
        tokio::spawn(async move { refresher.run_loop().await });
    } else {
        tracing::info!("Background refresh disabled");
    }

    let app = routes::configure_routes(tz);

    let port = config.server.port;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    tracing::info!("Attempting to bind server to http://{}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!("Server successfully bound to {}", addr);
            listener
        }
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(
                    "Error: Port {} is already in use. Please ensure no other process is using this port.",
                    port
                );
            } else {
                tracing::error!("Failed to bind to port {}. Error: {}", port, e);
            }
            return Err(e.into());
        }
    };

    axum::serve(listener, app).await?;

    Ok(())
}
