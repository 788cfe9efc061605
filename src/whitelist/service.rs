/// Link reconciliation service
///
/// Turns "Discord user X claims VRChat display name Y" into a validated,
/// uniqueness-checked link: search, ownership check, upsert.
use crate::{
    config::ServerConfig,
    error::{WhitelistError, WhitelistResult},
    store::{LinkRecord, LinkStore, LinkUpsert},
    vrchat::VrchatDirectory,
};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Behaviour switches for the service
#[derive(Debug, Clone)]
pub struct WhitelistOptions {
    /// Keep the stored note when an existing link is re-registered
    pub preserve_note: bool,
    /// Deadline for each store call
    pub store_timeout: Duration,
    /// Deadline for a whole VRChat resolution, login and retry included
    pub vrchat_timeout: Duration,
}

impl Default for WhitelistOptions {
    fn default() -> Self {
        Self {
            preserve_note: false,
            store_timeout: Duration::from_secs(5),
            vrchat_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ServerConfig> for WhitelistOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            preserve_note: config.whitelist.preserve_note,
            store_timeout: config.storage.timeout(),
            // login + verify + search + re-login + verify + search
            vrchat_timeout: config.vrchat.timeout() * 6,
        }
    }
}

/// Whitelist service
pub struct WhitelistService {
    store: Arc<dyn LinkStore>,
    vrchat: Arc<dyn VrchatDirectory>,
    options: WhitelistOptions,
}

impl WhitelistService {
    pub fn new(
        store: Arc<dyn LinkStore>,
        vrchat: Arc<dyn VrchatDirectory>,
        options: WhitelistOptions,
    ) -> Self {
        Self {
            store,
            vrchat,
            options,
        }
    }

    /// Link a Discord user to the VRChat account with exactly this display name.
    ///
    /// Returns `true` when the Discord user had no link before.
    pub async fn register_link(&self, discord_user_id: &str, vrc_display_name: &str) -> WhitelistResult<bool> {
        let discord_user_id = require("discord_user_id", discord_user_id)?;
        let vrc_display_name = require("vrc_display_name", vrc_display_name)?;

        let user = bounded(
            "vrchat search",
            self.options.vrchat_timeout,
            self.vrchat.search_exact_by_display_name(vrc_display_name),
        )
        .await
        .map_err(|e| {
            debug!(discord_user_id, vrc_display_name, error = %e, "VRChat resolution failed");
            e
        })?;

        let owner = self
            .store_call(self.store.get_by_vrc_user_id(&user.id))
            .await?;
        if let Some(owner) = owner {
            if owner.discord_user_id != discord_user_id {
                warn!(
                    discord_user_id,
                    vrc_user_id = %user.id,
                    owner = %owner.discord_user_id,
                    "VRChat account already linked to another Discord user"
                );
                return Err(WhitelistError::AlreadyLinkedElsewhere);
            }
        }

        let existing = self
            .store_call(self.store.get_by_discord_id(discord_user_id))
            .await?;

        let note = if self.options.preserve_note {
            existing.as_ref().and_then(|r| r.note.clone())
        } else {
            None
        };

        let link = LinkUpsert {
            discord_user_id: discord_user_id.to_string(),
            vrc_user_id: user.id,
            vrc_display_name: user.display_name,
            vrc_avatar_url: user.avatar_url,
            note,
        };

        match self.store_call(self.store.upsert(&link)).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation() => {
                // Lost a race with another registration for the same VRChat id
                warn!(
                    discord_user_id,
                    vrc_user_id = %link.vrc_user_id,
                    "unique constraint rejected link"
                );
                return Err(WhitelistError::AlreadyLinkedElsewhere);
            }
            Err(e) => return Err(e),
        }

        let created = existing.is_none();
        info!(
            discord_user_id,
            vrc_user_id = %link.vrc_user_id,
            created,
            "whitelist link registered"
        );
        Ok(created)
    }

    /// Current link for a Discord user; `None` means not linked
    pub async fn get_link(&self, discord_user_id: &str) -> WhitelistResult<Option<LinkRecord>> {
        let discord_user_id = require("discord_user_id", discord_user_id)?;
        self.store_call(self.store.get_by_discord_id(discord_user_id))
            .await
    }

    /// Remove a Discord user's link. Unlinking an unlinked user is not an error.
    pub async fn unlink(&self, discord_user_id: &str) -> WhitelistResult<()> {
        let discord_user_id = require("discord_user_id", discord_user_id)?;
        let removed = self
            .store_call(self.store.delete_by_discord_id(discord_user_id))
            .await?;

        info!(discord_user_id, removed, "whitelist link removed");
        Ok(())
    }

    /// Whether a Discord user is whitelisted
    pub async fn is_allowed(&self, discord_user_id: &str) -> WhitelistResult<bool> {
        let discord_user_id = require("discord_user_id", discord_user_id)?;
        self.store_call(self.store.exists_by_discord_id(discord_user_id))
            .await
    }

    /// Whether a VRChat account is whitelisted (world-side checks)
    pub async fn is_allowed_by_vrc_user_id(&self, vrc_user_id: &str) -> WhitelistResult<bool> {
        let vrc_user_id = require("vrc_user_id", vrc_user_id)?;
        self.store_call(self.store.exists_by_vrc_user_id(vrc_user_id))
            .await
    }

    /// Store connectivity for readiness probes
    pub async fn ping_store(&self) -> WhitelistResult<()> {
        self.store_call(self.store.ping()).await
    }

    async fn store_call<T, F>(&self, fut: F) -> WhitelistResult<T>
    where
        F: Future<Output = WhitelistResult<T>>,
    {
        bounded("store", self.options.store_timeout, fut).await
    }
}

/// Trimmed, non-empty argument or `InvalidArgument`
fn require<'a>(field: &str, value: &'a str) -> WhitelistResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WhitelistError::InvalidArgument(format!("{} is required", field)));
    }
    Ok(trimmed)
}

async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> WhitelistResult<T>
where
    F: Future<Output = WhitelistResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| WhitelistError::Timeout(format!("{} exceeded {:?}", what, limit)))?
}
