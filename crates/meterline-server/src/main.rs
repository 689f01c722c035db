//! meterline server
//!
//! - `/health`, `/hello`, `/readyz`, `/metrics`
//! - Per-request count and latency recorded by the instrumentation layer
//! - Graceful shutdown on Ctrl-C / SIGTERM

use tracing_subscriber::{fmt, EnvFilter};

use meterline_core::error::Result;
use meterline_server::{app_state, config, router, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let state = app_state::AppState::new(config::load()?);
    let listen = state.cfg().server.listen_addr()?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "meterline-server starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal(state))
        .await?;

    tracing::info!("meterline-server stopped");
    Ok(())
}
