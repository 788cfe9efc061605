/// Whitelist Bridge
///
/// Links Discord users to VRChat accounts (exact display-name match, one
/// owner per VRChat account) and answers "is this user whitelisted?" for
/// the HTTP API and the Discord bot panel.

mod api;
mod config;
mod context;
mod db;
mod error;
mod health;
mod panel;
mod server;
mod store;
mod vrchat;
mod whitelist;

use config::ServerConfig;
use context::AppContext;
use error::WhitelistResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> WhitelistResult<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "whitelist_bridge=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Load configuration
    let config = ServerConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        e
    })?;
    tracing::info!(
        version = %config.service.version,
        vrchat_api = %config.vrchat.base_url,
        database = %config.storage.database_path.display(),
        "starting whitelist bridge"
    );

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
