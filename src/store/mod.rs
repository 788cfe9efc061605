/// Identity link storage
///
/// One row per Discord user, and the VRChat id is unique across all rows.
/// Both constraints live in the database so concurrent writers are caught
/// there rather than by in-process locking.

pub mod models;
pub mod sqlite;

pub use models::{LinkRecord, LinkUpsert};
pub use sqlite::SqliteLinkStore;

use crate::error::WhitelistResult;
use async_trait::async_trait;

/// Link storage backend trait
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Fetch the link owned by a Discord user
    async fn get_by_discord_id(&self, discord_user_id: &str) -> WhitelistResult<Option<LinkRecord>>;

    /// Fetch the link pointing at a VRChat account
    async fn get_by_vrc_user_id(&self, vrc_user_id: &str) -> WhitelistResult<Option<LinkRecord>>;

    async fn exists_by_discord_id(&self, discord_user_id: &str) -> WhitelistResult<bool>;

    async fn exists_by_vrc_user_id(&self, vrc_user_id: &str) -> WhitelistResult<bool>;

    /// Insert or replace the link for `link.discord_user_id`.
    ///
    /// A VRChat id already owned by another row surfaces as a store error
    /// for which `is_unique_violation()` is true.
    async fn upsert(&self, link: &LinkUpsert) -> WhitelistResult<()>;

    /// Delete the link for a Discord user, returning whether a row existed
    async fn delete_by_discord_id(&self, discord_user_id: &str) -> WhitelistResult<bool>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> WhitelistResult<()>;
}
