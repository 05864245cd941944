//! Playlist CRUD operations and season allocation.

use crate::error::DatabaseError;
use crate::numbering::next_season_number;
use crate::types::{ChannelId, PlaylistId};
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, NewPlaylist, Playlist, now_ts};

const PLAYLIST_COLUMNS: &str = "id, remote_id, channel_id, title, monitored, season_number, \
     quality, download_root, last_sync, added_at";

impl Database {
    /// Insert a new playlist, allocating the smallest free season of its channel
    ///
    /// The read of the channel's seasons and the insert run under one
    /// `BEGIN IMMEDIATE` transaction, so two concurrent inserts for the same
    /// channel serialize and cannot pick the same season.
    pub async fn insert_playlist(&self, playlist: &NewPlaylist) -> Result<Playlist> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to begin playlist transaction: {}",
                    e
                )))
            })?;

        let result = Self::insert_playlist_in(&mut conn, playlist).await;

        match result {
            Ok(row) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::QueryFailed(format!(
                            "Failed to commit playlist: {}",
                            e
                        )))
                    })?;
                tracing::debug!(
                    playlist_id = row.id.get(),
                    channel_id = row.channel_id.get(),
                    season = row.season_number,
                    "playlist mapped to season"
                );
                Ok(row)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn insert_playlist_in(
        conn: &mut SqliteConnection,
        playlist: &NewPlaylist,
    ) -> Result<Playlist> {
        let seasons: Vec<u32> =
            sqlx::query_scalar("SELECT season_number FROM playlists WHERE channel_id = ?")
                .bind(playlist.channel_id)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to read allocated seasons: {}",
                        e
                    )))
                })?;

        let season = next_season_number(seasons);

        let result = sqlx::query(
            r#"
            INSERT INTO playlists (
                remote_id, channel_id, title, monitored, season_number,
                quality, download_root, added_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&playlist.remote_id)
        .bind(playlist.channel_id)
        .bind(&playlist.title)
        .bind(playlist.monitored)
        .bind(season)
        .bind(playlist.quality)
        .bind(
            playlist
                .download_root
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(now_ts())
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_write("Failed to insert playlist", e)))?;

        let sql = format!("SELECT {} FROM playlists WHERE id = ?", PLAYLIST_COLUMNS);
        sqlx::query_as::<_, Playlist>(&sql)
            .bind(result.last_insert_rowid())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read inserted playlist: {}",
                    e
                )))
            })
    }

    /// Get a playlist by ID
    pub async fn get_playlist(&self, id: PlaylistId) -> Result<Option<Playlist>> {
        let sql = format!("SELECT {} FROM playlists WHERE id = ?", PLAYLIST_COLUMNS);
        sqlx::query_as::<_, Playlist>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get playlist: {}",
                    e
                )))
            })
    }

    /// Get a playlist by ID, or [`Error::NotFound`]
    pub async fn require_playlist(&self, id: PlaylistId) -> Result<Playlist> {
        self.get_playlist(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("playlist {}", id)))
    }

    /// Get a playlist by its remote id
    pub async fn get_playlist_by_remote_id(&self, remote_id: &str) -> Result<Option<Playlist>> {
        let sql = format!(
            "SELECT {} FROM playlists WHERE remote_id = ?",
            PLAYLIST_COLUMNS
        );
        sqlx::query_as::<_, Playlist>(&sql)
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get playlist by remote id: {}",
                    e
                )))
            })
    }

    /// List a channel's playlists ordered by season
    pub async fn list_playlists(&self, channel_id: ChannelId) -> Result<Vec<Playlist>> {
        let sql = format!(
            "SELECT {} FROM playlists WHERE channel_id = ? ORDER BY season_number ASC",
            PLAYLIST_COLUMNS
        );
        sqlx::query_as::<_, Playlist>(&sql)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list playlists: {}",
                    e
                )))
            })
    }

    /// List a channel's monitored playlists ordered by season
    pub async fn list_monitored_playlists(&self, channel_id: ChannelId) -> Result<Vec<Playlist>> {
        let sql = format!(
            "SELECT {} FROM playlists WHERE channel_id = ? AND monitored = 1 \
             ORDER BY season_number ASC",
            PLAYLIST_COLUMNS
        );
        sqlx::query_as::<_, Playlist>(&sql)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list monitored playlists: {}",
                    e
                )))
            })
    }

    /// Set the monitored flag; returns false if the playlist does not exist
    pub async fn set_playlist_monitored(&self, id: PlaylistId, monitored: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE playlists SET monitored = ? WHERE id = ?")
            .bind(monitored)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update playlist: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a completed sync
    pub async fn touch_playlist_sync(&self, id: PlaylistId) -> Result<()> {
        sqlx::query("UPDATE playlists SET last_sync = ? WHERE id = ?")
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to record playlist sync: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete a playlist and free its season
    ///
    /// Videos placed through the playlist lose their season, episode and
    /// playlist link; their rows and files stay. The season's counter row is
    /// dropped so a later playlist reusing the number starts at episode 1.
    pub async fn delete_playlist(&self, id: PlaylistId) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let Some((channel_id, season)): Option<(ChannelId, u32)> =
            sqlx::query_as("SELECT channel_id, season_number FROM playlists WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get playlist: {}",
                        e
                    )))
                })?
        else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE videos
            SET season_number = NULL, episode_number = NULL, playlist_id = NULL, updated_at = ?
            WHERE channel_id = ? AND (playlist_id = ? OR season_number = ?)
            "#,
        )
        .bind(now_ts())
        .bind(channel_id)
        .bind(id)
        .bind(season)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to release playlist videos: {}",
                e
            )))
        })?;

        sqlx::query("DELETE FROM episode_counters WHERE channel_id = ? AND season_number = ?")
            .bind(channel_id)
            .bind(season)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to drop season counter: {}",
                    e
                )))
            })?;

        sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete playlist: {}",
                    e
                )))
            })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit playlist deletion: {}",
                e
            )))
        })?;

        Ok(true)
    }
}
