/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    db,
    error::WhitelistResult,
    health::HealthService,
    panel::PanelHandler,
    store::{LinkStore, SqliteLinkStore},
    vrchat::{HttpVrchatClient, VrchatDirectory},
    whitelist::{WhitelistOptions, WhitelistService},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: Option<SqlitePool>,
    pub whitelist: Arc<WhitelistService>,
    pub health: Arc<HealthService>,
    pub panel: PanelHandler,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> WhitelistResult<Self> {
        let pool = db::connect(&config.storage).await?;

        let store: Arc<dyn LinkStore> = Arc::new(SqliteLinkStore::new(pool.clone()));
        let vrchat: Arc<dyn VrchatDirectory> =
            Arc::new(HttpVrchatClient::new(config.vrchat.clone(), &config.service.version)?);

        let mut ctx = Self::from_parts(config, store, vrchat);
        ctx.db = Some(pool);
        Ok(ctx)
    }

    /// Wire the services around an existing store and VRChat directory
    pub fn from_parts(
        config: ServerConfig,
        store: Arc<dyn LinkStore>,
        vrchat: Arc<dyn VrchatDirectory>,
    ) -> Self {
        let options = WhitelistOptions::from(&config);
        let whitelist = Arc::new(WhitelistService::new(store, vrchat, options));
        let health = Arc::new(HealthService::new(
            Arc::clone(&whitelist),
            config.service.version.clone(),
        ));
        let panel = PanelHandler::new(Arc::clone(&whitelist));

        Self {
            config: Arc::new(config),
            db: None,
            whitelist,
            health,
            panel,
        }
    }

    /// Mark ready once the store answers
    pub async fn warm_up(&self) {
        self.health.mark_ready();
        if !self.health.ready().await {
            tracing::warn!("store not reachable at startup; staying not ready");
            self.health.mark_not_ready();
        }
    }

    /// Release the connection pool after the server has drained
    pub async fn close(&self) {
        if let Some(pool) = &self.db {
            pool.close().await;
        }
    }
}
