/// SQLite implementation of the link store
use crate::{
    error::{WhitelistError, WhitelistResult},
    store::{LinkRecord, LinkStore, LinkUpsert},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const SELECT_COLUMNS: &str = "SELECT id, discord_user_id, vrc_user_id, vrc_display_name, \
     vrc_avatar_url, note, created_at, updated_at FROM whitelist_users";

/// Link store backed by the `whitelist_users` table
#[derive(Clone)]
pub struct SqliteLinkStore {
    db: SqlitePool,
}

impl SqliteLinkStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(&self, column: &str, value: &str) -> WhitelistResult<Option<LinkRecord>> {
        let sql = format!("{} WHERE {} = ?1", SELECT_COLUMNS, column);

        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn exists_where(&self, column: &str, value: &str) -> WhitelistResult<bool> {
        let sql = format!("SELECT 1 FROM whitelist_users WHERE {} = ?1 LIMIT 1", column);

        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.is_some())
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn get_by_discord_id(&self, discord_user_id: &str) -> WhitelistResult<Option<LinkRecord>> {
        self.fetch_one_where("discord_user_id", discord_user_id).await
    }

    async fn get_by_vrc_user_id(&self, vrc_user_id: &str) -> WhitelistResult<Option<LinkRecord>> {
        self.fetch_one_where("vrc_user_id", vrc_user_id).await
    }

    async fn exists_by_discord_id(&self, discord_user_id: &str) -> WhitelistResult<bool> {
        self.exists_where("discord_user_id", discord_user_id).await
    }

    async fn exists_by_vrc_user_id(&self, vrc_user_id: &str) -> WhitelistResult<bool> {
        self.exists_where("vrc_user_id", vrc_user_id).await
    }

    async fn upsert(&self, link: &LinkUpsert) -> WhitelistResult<()> {
        let now = Utc::now().to_rfc3339();

        // ON CONFLICT only covers discord_user_id; a clash on vrc_user_id
        // with another row still fails with a unique violation.
        sqlx::query(
            r#"
            INSERT INTO whitelist_users
                (discord_user_id, vrc_user_id, vrc_display_name, vrc_avatar_url, note, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(discord_user_id) DO UPDATE SET
                vrc_user_id = excluded.vrc_user_id,
                vrc_display_name = excluded.vrc_display_name,
                vrc_avatar_url = excluded.vrc_avatar_url,
                note = excluded.note,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&link.discord_user_id)
        .bind(&link.vrc_user_id)
        .bind(&link.vrc_display_name)
        .bind(&link.vrc_avatar_url)
        .bind(&link.note)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn delete_by_discord_id(&self, discord_user_id: &str) -> WhitelistResult<bool> {
        let result = sqlx::query("DELETE FROM whitelist_users WHERE discord_user_id = ?1")
            .bind(discord_user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> WhitelistResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

fn row_to_record(row: &SqliteRow) -> WhitelistResult<LinkRecord> {
    Ok(LinkRecord {
        id: row.try_get("id")?,
        discord_user_id: row.try_get("discord_user_id")?,
        vrc_user_id: row.try_get("vrc_user_id")?,
        vrc_display_name: row.try_get("vrc_display_name")?,
        vrc_avatar_url: row.try_get("vrc_avatar_url")?,
        note: row.try_get("note")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

/// Parse RFC3339 timestamp
fn parse_timestamp(s: &str) -> WhitelistResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WhitelistError::Internal(format!("Invalid timestamp: {}", e)))
}
