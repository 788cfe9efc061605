/// VRChat API access
///
/// The reconciliation service only sees the [`VrchatDirectory`] trait; the
/// HTTP implementation handles login, TOTP verification and session reuse.

pub mod client;
pub mod totp;

pub use client::HttpVrchatClient;

use crate::error::WhitelistResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The subset of a VRChat user returned by "Search All Users" that we keep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VrchatUser {
    pub id: String,
    pub display_name: String,
    #[serde(default, rename = "currentAvatarThumbnailImageUrl")]
    pub avatar_url: Option<String>,
}

/// Exact display-name lookup against VRChat
#[async_trait]
pub trait VrchatDirectory: Send + Sync {
    /// Resolve a display name to exactly one user.
    ///
    /// Fails with `NoExactMatch` for zero matches (or an empty name) and
    /// `MultipleExactMatch` when the name is shared.
    async fn search_exact_by_display_name(&self, display_name: &str) -> WhitelistResult<VrchatUser>;
}
