use std::net::SocketAddr;

use anyhow::{Context, Result};
use wxproxy_core::Settings;
use wxproxy_server::AppState;
use wxproxy_store::{CallRecordStore, Database};
use wxproxy_weather::{CacheProvider, Dispatcher, UpstreamClient, UpstreamConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let (settings, validation) = Settings::load_validated()?;
    let _log_guard = wxproxy_core::init_logging(&settings.log_dir);

    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }
    tracing::debug!(?settings, "Settings loaded");

    let db = Database::from_settings(&settings);
    if settings.db_init_schema && db.is_configured() {
        if let Err(e) = db.ensure_schema().await {
            tracing::error!("Could not create call record table: {}", e);
        }
    }

    let cache = CacheProvider::connect(settings.redis_url.as_deref()).await;
    let client = UpstreamClient::new(UpstreamConfig::from(&settings), cache);
    let dispatcher = Dispatcher::new(client, settings.request_timeout());
    let state = AppState::new(dispatcher, CallRecordStore::new(db));

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid BIND_ADDR: {}", settings.bind_addr))?;

    let (bound, server) = warp::serve(wxproxy_server::routes(state))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .with_context(|| format!("Could not bind {}", addr))?;

    tracing::info!("wxproxy listening on {}", bound);
    server.await;
    tracing::info!("wxproxy stopped");

    Ok(())
}
