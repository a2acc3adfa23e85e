use std::net::SocketAddr;

use dev_server::{build_router, config::load_settings, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let frontend_url = settings.frontend_url()?;
    let app = build_router(AppState::new(frontend_url.clone()));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, %frontend_url, "dev server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
