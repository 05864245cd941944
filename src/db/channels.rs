//! Channel CRUD operations.

use crate::error::DatabaseError;
use crate::types::ChannelId;
use crate::{Error, Result};

use super::{Channel, Database, NewChannel, now_ts};

const CHANNEL_COLUMNS: &str = "id, remote_id, name, url, thumbnail, description, monitored, \
     download_root, quality, last_sync, added_at";

impl Database {
    /// Insert a new channel
    ///
    /// A duplicate remote id is a [`DatabaseError::ConstraintViolation`].
    pub async fn insert_channel(&self, channel: &NewChannel) -> Result<ChannelId> {
        let result = sqlx::query(
            r#"
            INSERT INTO channels (
                remote_id, name, url, thumbnail, description,
                monitored, download_root, quality, added_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.remote_id)
        .bind(&channel.name)
        .bind(&channel.url)
        .bind(&channel.thumbnail)
        .bind(&channel.description)
        .bind(channel.monitored)
        .bind(channel.download_root.to_string_lossy().into_owned())
        .bind(channel.quality)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_write("Failed to insert channel", e)))?;

        Ok(ChannelId(result.last_insert_rowid()))
    }

    /// Get a channel by ID
    pub async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        let sql = format!("SELECT {} FROM channels WHERE id = ?", CHANNEL_COLUMNS);
        sqlx::query_as::<_, Channel>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get channel: {}",
                    e
                )))
            })
    }

    /// Get a channel by ID, or [`Error::NotFound`]
    pub async fn require_channel(&self, id: ChannelId) -> Result<Channel> {
        self.get_channel(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("channel {}", id)))
    }

    /// Get a channel by its remote id
    pub async fn get_channel_by_remote_id(&self, remote_id: &str) -> Result<Option<Channel>> {
        let sql = format!("SELECT {} FROM channels WHERE remote_id = ?", CHANNEL_COLUMNS);
        sqlx::query_as::<_, Channel>(&sql)
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get channel by remote id: {}",
                    e
                )))
            })
    }

    /// List all channels, most recently added first
    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        let sql = format!(
            "SELECT {} FROM channels ORDER BY added_at DESC, id DESC",
            CHANNEL_COLUMNS
        );
        sqlx::query_as::<_, Channel>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list channels: {}",
                    e
                )))
            })
    }

    /// List monitored channels in insertion order
    pub async fn list_monitored_channels(&self) -> Result<Vec<Channel>> {
        let sql = format!(
            "SELECT {} FROM channels WHERE monitored = 1 ORDER BY id ASC",
            CHANNEL_COLUMNS
        );
        sqlx::query_as::<_, Channel>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list monitored channels: {}",
                    e
                )))
            })
    }

    /// Set the monitored flag; returns false if the channel does not exist
    pub async fn set_channel_monitored(&self, id: ChannelId, monitored: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE channels SET monitored = ? WHERE id = ?")
            .bind(monitored)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update channel: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a completed sync
    pub async fn touch_channel_sync(&self, id: ChannelId) -> Result<()> {
        sqlx::query("UPDATE channels SET last_sync = ? WHERE id = ?")
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to record channel sync: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete a channel together with its playlists, videos and counters
    ///
    /// Files on disk are not touched.
    pub async fn delete_channel(&self, id: ChannelId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete channel: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of channels
    pub async fn count_channels(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM channels")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count channels: {}",
                    e
                )))
            })
    }
}
