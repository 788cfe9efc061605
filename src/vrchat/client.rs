/// HTTP client for the VRChat API
///
/// Login is `GET /auth/user` with basic credentials, followed by
/// `POST /auth/twofactorauth/totp/verify` when the account asks for TOTP.
/// The resulting `auth` cookie lives in a per-session cookie jar.
use crate::{
    config::VrchatConfig,
    error::{WhitelistError, WhitelistResult},
    vrchat::{totp, VrchatDirectory, VrchatUser},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::{cookie::Jar, header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// An authenticated VRChat session
#[derive(Clone)]
struct Session {
    http: Client,
    generation: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUserResponse {
    #[serde(default)]
    requires_two_factor_auth: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TotpVerifyRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct TotpVerifyResponse {
    verified: Option<bool>,
}

/// Outcome of one search call that did not hit a transport failure
enum SearchAttempt {
    Found(Vec<VrchatUser>),
    Unauthorized,
}

/// VRChat client with a lazily established, process-wide session
pub struct HttpVrchatClient {
    config: VrchatConfig,
    user_agent: String,
    session: RwLock<Option<Session>>,
    /// Held for the whole login sequence so only one runs at a time
    login_guard: Mutex<u64>,
}

impl HttpVrchatClient {
    /// Create a new client. No network traffic happens until the first search.
    pub fn new(config: VrchatConfig, version: &str) -> WhitelistResult<Self> {
        totp::decode_secret(&config.totp_secret)?;
        let user_agent = config.user_agent(version);

        Ok(Self {
            config,
            user_agent,
            session: RwLock::new(None),
            login_guard: Mutex::new(0),
        })
    }

    /// Build an HTTP client bound to a fresh cookie jar
    fn build_http_client(&self) -> WhitelistResult<Client> {
        Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.config.timeout())
            .cookie_provider(Arc::new(Jar::default()))
            .build()
            .map_err(|e| WhitelistError::Internal(format!("Failed to create HTTP client: {}", e)))
    }

    /// Return the cached session or log in
    async fn ensure_session(&self) -> WhitelistResult<Session> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }

        let mut generation = self.login_guard.lock().await;

        // Another caller may have finished logging in while we waited
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }

        self.login_locked(&mut generation).await
    }

    /// Discard the session identified by `stale` and log in again.
    ///
    /// If a concurrent caller already replaced that session, its result is
    /// reused instead of performing a second login.
    async fn force_relogin(&self, stale: u64) -> WhitelistResult<Session> {
        let mut generation = self.login_guard.lock().await;

        if let Some(session) = self.session.read().await.clone() {
            if session.generation != stale {
                debug!(generation = session.generation, "session already renewed");
                return Ok(session);
            }
        }

        *self.session.write().await = None;
        self.login_locked(&mut generation).await
    }

    /// Run the login sequence. Caller must hold `login_guard`.
    async fn login_locked(&self, generation: &mut u64) -> WhitelistResult<Session> {
        let http = self.build_http_client()?;
        self.login_with_two_factor(&http).await?;

        *generation += 1;
        let session = Session {
            http,
            generation: *generation,
        };
        *self.session.write().await = Some(session.clone());

        info!(generation = session.generation, "VRChat session established");
        Ok(session)
    }

    async fn login_with_two_factor(&self, http: &Client) -> WhitelistResult<()> {
        let url = format!("{}/auth/user", self.config.base_url);

        let response = http
            .get(&url)
            .header(
                header::AUTHORIZATION,
                format!(
                    "Basic {}",
                    basic_token(&self.config.username, &self.config.password)
                ),
            )
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                warn!("VRChat login rejected");
                return Err(WhitelistError::Auth(
                    "login unauthorized: check username/password or IP restrictions".to_string(),
                ));
            }
            status => {
                warn!(%status, "VRChat login failed");
                return Err(WhitelistError::Auth(format!("login failed with status {}", status)));
            }
        }

        let current: CurrentUserResponse = response
            .json()
            .await
            .map_err(|e| WhitelistError::Auth(format!("malformed login response: {}", e)))?;

        if current.requires_two_factor_auth.is_empty() {
            debug!("VRChat session does not require a second factor");
            return Ok(());
        }

        if !current.requires_two_factor_auth.iter().any(|f| f == "totp") {
            return Err(WhitelistError::Auth(format!(
                "unsupported second factor: {}",
                current.requires_two_factor_auth.join(",")
            )));
        }

        self.verify_totp(http).await
    }

    async fn verify_totp(&self, http: &Client) -> WhitelistResult<()> {
        let code = totp::generate_code(&self.config.totp_secret, Utc::now())?;
        let url = format!("{}/auth/twofactorauth/totp/verify", self.config.base_url);

        let response = http
            .post(&url)
            .json(&TotpVerifyRequest { code: &code })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                warn!("VRChat TOTP verification rejected");
                return Err(WhitelistError::Auth(
                    "TOTP verification unauthorized (wrong code or missing auth cookie)".to_string(),
                ));
            }
            status => {
                return Err(WhitelistError::Auth(format!(
                    "TOTP verification failed with status {}",
                    status
                )));
            }
        }

        let verify: TotpVerifyResponse = response.json().await.unwrap_or_default();
        if verify.verified == Some(false) {
            return Err(WhitelistError::Auth("TOTP code not accepted".to_string()));
        }

        Ok(())
    }

    async fn search_once(&self, http: &Client, display_name: &str) -> WhitelistResult<SearchAttempt> {
        let url = format!("{}/users", self.config.base_url);
        let page_size = self.config.search_page_size.to_string();

        let response = http
            .get(&url)
            .query(&[("search", display_name), ("n", page_size.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Ok(SearchAttempt::Unauthorized),
            status => {
                return Err(WhitelistError::Transport(format!(
                    "search users returned status {}",
                    status
                )));
            }
        }

        let users: Vec<VrchatUser> = response.json().await?;
        Ok(SearchAttempt::Found(users))
    }
}

#[async_trait]
impl VrchatDirectory for HttpVrchatClient {
    async fn search_exact_by_display_name(&self, display_name: &str) -> WhitelistResult<VrchatUser> {
        if display_name.is_empty() {
            return Err(WhitelistError::NoExactMatch);
        }

        let session = self.ensure_session().await?;

        let users = match self.search_once(&session.http, display_name).await? {
            SearchAttempt::Found(users) => users,
            SearchAttempt::Unauthorized => {
                info!("VRChat session expired, logging in again");
                let renewed = self.force_relogin(session.generation).await?;

                match self.search_once(&renewed.http, display_name).await? {
                    SearchAttempt::Found(users) => users,
                    SearchAttempt::Unauthorized => {
                        return Err(WhitelistError::Auth(
                            "search unauthorized after re-login".to_string(),
                        ));
                    }
                }
            }
        };

        debug!(results = users.len(), "VRChat user search finished");
        select_exact_match(users, display_name)
    }
}

/// Keep only users whose display name equals `display_name` byte for byte
pub fn select_exact_match(users: Vec<VrchatUser>, display_name: &str) -> WhitelistResult<VrchatUser> {
    let mut matches = users.into_iter().filter(|u| u.display_name == display_name);

    match (matches.next(), matches.next()) {
        (None, _) => Err(WhitelistError::NoExactMatch),
        (Some(user), None) => Ok(user),
        (Some(_), Some(_)) => Err(WhitelistError::MultipleExactMatch),
    }
}

/// `base64(urlencode(username) ":" urlencode(password))`
fn basic_token(username: &str, password: &str) -> String {
    let raw = format!(
        "{}:{}",
        urlencoding::encode(username),
        urlencoding::encode(password)
    );
    STANDARD.encode(raw)
}
