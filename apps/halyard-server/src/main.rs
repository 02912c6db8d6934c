use std::net::SocketAddr;

use anyhow::Context;
use halyard_core::Halyard;
use tracing::{info, warn};

mod access_log;
mod catalog;
mod proxy;
mod request_ctx;
mod routes;
mod state;

use catalog::{ApiRoot, Store};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    halyard_otel::init();
    let config = halyard_core::load_default().context("loading configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let upstream = config
        .server
        .upstream_url
        .clone()
        .unwrap_or_else(|| format!("http://{addr}"));

    let engine = Halyard::builder()
        .config(config)
        .contract::<ApiRoot>()
        .build()?;
    let app = routes::router(AppState::new(engine, Store::demo(), upstream.clone()));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, %upstream, "halyard server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server exited with error")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(%err, "SIGTERM handler unavailable; waiting for ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
