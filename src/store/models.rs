/// Whitelist link records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted Discord user <-> VRChat account link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Surrogate key assigned on insert
    pub id: i64,
    pub discord_user_id: String,
    pub vrc_user_id: String,
    /// Display name as last resolved; VRChat users can rename
    pub vrc_display_name: String,
    pub vrc_avatar_url: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable fields written by an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkUpsert {
    pub discord_user_id: String,
    pub vrc_user_id: String,
    pub vrc_display_name: String,
    pub vrc_avatar_url: Option<String>,
    pub note: Option<String>,
}
