/// Liveness and readiness state
use crate::whitelist::WhitelistService;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Combined health report for humans and monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub live: bool,
    pub ready: bool,
    pub db: bool,
    pub version: String,
    pub time: String,
}

/// Tracks whether the process should receive traffic
pub struct HealthService {
    whitelist: Arc<WhitelistService>,
    ready: AtomicBool,
    version: String,
}

impl HealthService {
    /// Starts out not ready
    pub fn new(whitelist: Arc<WhitelistService>, version: String) -> Self {
        Self {
            whitelist,
            ready: AtomicBool::new(false),
            version,
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Called first on shutdown so load balancers stop routing here
    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_marked_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Ready flag set and the store answers
    pub async fn ready(&self) -> bool {
        if !self.is_marked_ready() {
            return false;
        }
        self.db_ok().await
    }

    pub async fn report(&self) -> HealthReport {
        let db = self.db_ok().await;
        HealthReport {
            live: true,
            ready: self.is_marked_ready() && db,
            db,
            version: self.version.clone(),
            time: Utc::now().to_rfc3339(),
        }
    }

    async fn db_ok(&self) -> bool {
        match self.whitelist.ping_store().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "store ping failed");
                false
            }
        }
    }
}
