//! Admin HTTP surface: health check, catalog uploads, manual dispatch, job
//! status, and read-only diagnostics.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;

use crate::app::App;

/// Shared state for the web server.
pub type AppState = App;

/// Start the admin server on `bind` (`host:port`).
pub async fn serve(app: App, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.parse()?;
    let router = create_router(app);

    tracing::info!("Starting admin server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
