/// Configuration management for the whitelist bridge
use crate::error::{WhitelistError, WhitelistResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// VRChat never returns more than 100 users per search page
pub const MAX_SEARCH_PAGE_SIZE: u32 = 100;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub vrchat: VrchatConfig,
    pub whitelist: WhitelistConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// Startup ping backoff stops once the delay exceeds this
    pub connect_retry_max_ms: u64,
    /// Upper bound for a single store call
    pub timeout_secs: u64,
}

/// VRChat API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrchatConfig {
    pub base_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub totp_secret: String,
    pub contact_email: Option<String>,
    pub timeout_secs: u64,
    pub search_page_size: u32,
}

/// Business-rule switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistConfig {
    /// Keep an existing note when a Discord user re-registers
    pub preserve_note: bool,
}

impl VrchatConfig {
    pub fn user_agent(&self, version: &str) -> String {
        match &self.contact_email {
            Some(email) => format!("whitelist-bridge/{} {}", version, email),
            None => format!("whitelist-bridge/{}", version),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> WhitelistResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> WhitelistResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| WhitelistError::Config(format!("{} is required", key)))
        };

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| WhitelistError::Config("Invalid port number".to_string()))?;
        let version = var("APP_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        let database_path = var("WHITELIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/whitelist.sqlite"));
        let max_connections = parse_or(var("DB_MAX_CONNECTIONS"), 10);
        let connect_retry_max_ms = parse_or(var("DB_CONNECT_RETRY_MAX_MS"), 2000);
        let store_timeout_secs = parse_or(var("STORE_TIMEOUT_SECS"), 5);

        let base_url = var("VRCHAT_API_BASE_URL")
            .unwrap_or_else(|| "https://api.vrchat.cloud/api/1".to_string())
            .trim_end_matches('/')
            .to_string();
        let username = required("VRCHAT_USERNAME")?;
        let password = required("VRCHAT_PASSWORD")?;
        let totp_secret = required("VRCHAT_TOTP_SECRET")?;
        let contact_email = var("VRCHAT_CONTACT_EMAIL");
        let vrchat_timeout_secs = parse_or(var("VRCHAT_TIMEOUT_SECS"), 10);
        let search_page_size =
            parse_or(var("VRCHAT_SEARCH_PAGE_SIZE"), MAX_SEARCH_PAGE_SIZE).min(MAX_SEARCH_PAGE_SIZE);

        let preserve_note = parse_or(var("WHITELIST_PRESERVE_NOTE"), false);

        let config = ServerConfig {
            service: ServiceConfig {
                host,
                port,
                version,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
                connect_retry_max_ms,
                timeout_secs: store_timeout_secs,
            },
            vrchat: VrchatConfig {
                base_url,
                username,
                password,
                totp_secret,
                contact_email,
                timeout_secs: vrchat_timeout_secs,
                search_page_size,
            },
            whitelist: WhitelistConfig { preserve_note },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> WhitelistResult<()> {
        if !self.vrchat.base_url.starts_with("http://") && !self.vrchat.base_url.starts_with("https://")
        {
            return Err(WhitelistError::Config(
                "VRCHAT_API_BASE_URL must be an http(s) URL".to_string(),
            ));
        }

        if crate::vrchat::totp::decode_secret(&self.vrchat.totp_secret).is_err() {
            return Err(WhitelistError::Config(
                "VRCHAT_TOTP_SECRET is not valid base32".to_string(),
            ));
        }

        if self.vrchat.search_page_size == 0 {
            return Err(WhitelistError::Config(
                "VRCHAT_SEARCH_PAGE_SIZE must be positive".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(WhitelistError::Config(
                "DB_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
