//! Video CRUD, compare-and-set status transitions and read-side queries.

use crate::error::DatabaseError;
use crate::types::{
    CatalogStats, ChannelId, DownloadStatus, VideoFilter, VideoId, VideoQuery, VideoSort,
};
use crate::{Error, Result};

use super::{Database, NewVideo, Video, VideoMetadataUpdate, VideoPage, now_ts};

const VIDEO_COLUMNS: &str = "id, remote_id, channel_id, playlist_id, title, published_at, \
     duration_secs, season_number, episode_number, status, file_path, file_size, \
     error_message, created_at, updated_at";

/// `?, ?, ?` for an `IN (...)` list
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl Database {
    /// Insert a new video
    ///
    /// A duplicate remote id is a [`DatabaseError::ConstraintViolation`].
    pub async fn insert_video(&self, video: &NewVideo) -> Result<VideoId> {
        let now = now_ts();
        let result = sqlx::query(
            r#"
            INSERT INTO videos (
                remote_id, channel_id, title, published_at, duration_secs,
                status, file_path, file_size, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&video.remote_id)
        .bind(video.channel_id)
        .bind(&video.title)
        .bind(video.published_at)
        .bind(video.duration_secs)
        .bind(video.status)
        .bind(&video.file_path)
        .bind(video.file_size)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_write("Failed to insert video", e)))?;

        Ok(VideoId(result.last_insert_rowid()))
    }

    /// Insert a video unless its remote id is already catalogued
    ///
    /// Returns the new row id, or `None` if the remote id existed.
    pub async fn insert_video_if_absent(&self, video: &NewVideo) -> Result<Option<VideoId>> {
        let now = now_ts();
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO videos (
                remote_id, channel_id, title, published_at, duration_secs,
                status, file_path, file_size, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(remote_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&video.remote_id)
        .bind(video.channel_id)
        .bind(&video.title)
        .bind(video.published_at)
        .bind(video.duration_secs)
        .bind(video.status)
        .bind(&video.file_path)
        .bind(video.file_size)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_write("Failed to insert video", e)))?;

        Ok(id.map(VideoId))
    }

    /// Get a video by ID
    pub async fn get_video(&self, id: VideoId) -> Result<Option<Video>> {
        let sql = format!("SELECT {} FROM videos WHERE id = ?", VIDEO_COLUMNS);
        sqlx::query_as::<_, Video>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get video: {}",
                    e
                )))
            })
    }

    /// Get a video by ID, or [`Error::NotFound`]
    pub async fn require_video(&self, id: VideoId) -> Result<Video> {
        self.get_video(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("video {}", id)))
    }

    /// Get a video by its remote id
    pub async fn get_video_by_remote_id(&self, remote_id: &str) -> Result<Option<Video>> {
        let sql = format!("SELECT {} FROM videos WHERE remote_id = ?", VIDEO_COLUMNS);
        sqlx::query_as::<_, Video>(&sql)
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get video by remote id: {}",
                    e
                )))
            })
    }

    /// Every video of a channel, in catalog order
    pub async fn list_videos_for_channel(&self, channel_id: ChannelId) -> Result<Vec<Video>> {
        let sql = format!(
            "SELECT {} FROM videos WHERE channel_id = ? ORDER BY id ASC",
            VIDEO_COLUMNS
        );
        sqlx::query_as::<_, Video>(&sql)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list channel videos: {}",
                    e
                )))
            })
    }

    /// Videos in any of `statuses`, oldest first
    pub async fn list_videos_by_status(&self, statuses: &[DownloadStatus]) -> Result<Vec<Video>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM videos WHERE status IN ({}) ORDER BY updated_at ASC, id ASC",
            VIDEO_COLUMNS,
            placeholders(statuses.len())
        );
        let mut query = sqlx::query_as::<_, Video>(&sql);
        for status in statuses {
            query = query.bind(*status);
        }

        query.fetch_all(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list videos by status: {}",
                e
            )))
        })
    }

    /// Compare-and-set the status
    ///
    /// Moves the row to `to` only if its current status is one of `from`.
    /// Returns whether the row changed. Leaving `failed` clears the recorded
    /// error.
    pub async fn transition_status(
        &self,
        id: VideoId,
        from: &[DownloadStatus],
        to: DownloadStatus,
    ) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            r#"
            UPDATE videos
            SET status = ?,
                error_message = CASE WHEN ? = 'failed' THEN error_message ELSE NULL END,
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql).bind(to).bind(to).bind(now_ts()).bind(id);
        for status in from {
            query = query.bind(*status);
        }

        let result = query.execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update video status: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a file on disk: status `completed`, path and size set
    ///
    /// Compare-and-set against `from`.
    pub async fn mark_completed(
        &self,
        id: VideoId,
        path: &str,
        size: Option<i64>,
        from: &[DownloadStatus],
    ) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            r#"
            UPDATE videos
            SET status = 'completed', file_path = ?, file_size = ?,
                error_message = NULL, updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(path)
            .bind(size)
            .bind(now_ts())
            .bind(id);
        for status in from {
            query = query.bind(*status);
        }

        let result = query.execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark video completed: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failed attempt; only a queued or downloading row can fail
    pub async fn mark_failed(&self, id: VideoId, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET status = 'failed', error_message = ?, updated_at = ?
            WHERE id = ? AND status IN ('queued', 'downloading')
            "#,
        )
        .bind(error)
        .bind(now_ts())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark video failed: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// A completed row whose file is gone: back to `pending`, path cleared
    ///
    /// Only applies while the row still points at `expected_path`, so a
    /// download that completed after the caller looked is left alone.
    pub async fn mark_missing(&self, id: VideoId, expected_path: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET status = 'pending', file_path = NULL, file_size = NULL, updated_at = ?
            WHERE id = ? AND status = 'completed' AND file_path IS ?
            "#,
        )
        .bind(now_ts())
        .bind(id)
        .bind(expected_path)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark video missing: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Point a completed row at a relocated file
    pub async fn update_file_path(&self, id: VideoId, path: &str, size: Option<i64>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET file_path = ?, file_size = COALESCE(?, file_size), updated_at = ?
            WHERE id = ? AND status = 'completed'
            "#,
        )
        .bind(path)
        .bind(size)
        .bind(now_ts())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update file path: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite metadata columns that have a new value
    pub async fn update_metadata(&self, id: VideoId, update: &VideoMetadataUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET title = COALESCE(?, title),
                published_at = COALESCE(?, published_at),
                duration_secs = COALESCE(?, duration_secs),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.title)
        .bind(update.published_at)
        .bind(update.duration_secs)
        .bind(now_ts())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update video metadata: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Set the duration if the row has none
    pub async fn fill_missing_duration(&self, id: VideoId, duration_secs: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE videos SET duration_secs = ?, updated_at = ? \
             WHERE id = ? AND duration_secs IS NULL",
        )
        .bind(duration_secs)
        .bind(now_ts())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fill video duration: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a video row
    pub async fn delete_video(&self, id: VideoId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete video: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// One page of a channel's videos
    pub async fn list_channel_videos(
        &self,
        channel_id: ChannelId,
        query: VideoQuery,
    ) -> Result<VideoPage> {
        let filter = match query.filter {
            VideoFilter::All => "",
            VideoFilter::Downloaded => " AND status = 'completed'",
            VideoFilter::Available => " AND status != 'completed'",
        };
        let order = match query.sort {
            VideoSort::DateDesc => "COALESCE(published_at, created_at) DESC, id DESC",
            VideoSort::DateAsc => "COALESCE(published_at, created_at) ASC, id ASC",
            VideoSort::Title => "title COLLATE NOCASE ASC, id ASC",
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM videos WHERE channel_id = ?{}",
            filter
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(channel_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count channel videos: {}",
                    e
                )))
            })?;

        let sql = format!(
            "SELECT {} FROM videos WHERE channel_id = ?{} ORDER BY {} LIMIT ? OFFSET ?",
            VIDEO_COLUMNS, filter, order
        );
        let videos = sqlx::query_as::<_, Video>(&sql)
            .bind(channel_id)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list channel videos: {}",
                    e
                )))
            })?;

        let has_more = i64::from(query.offset) + (videos.len() as i64) < total;
        Ok(VideoPage {
            videos,
            total,
            has_more,
        })
    }

    /// Videos waiting for or undergoing a download
    pub async fn list_queue(&self) -> Result<Vec<Video>> {
        let sql = format!(
            "SELECT {} FROM videos WHERE status IN ('pending', 'queued', 'downloading') \
             ORDER BY CASE status WHEN 'downloading' THEN 0 WHEN 'queued' THEN 1 ELSE 2 END, \
             updated_at ASC, id ASC",
            VIDEO_COLUMNS
        );
        sqlx::query_as::<_, Video>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list queue: {}",
                    e
                )))
            })
    }

    /// Most recently completed downloads
    pub async fn list_history(&self, limit: u32) -> Result<Vec<Video>> {
        let sql = format!(
            "SELECT {} FROM videos WHERE status = 'completed' \
             ORDER BY updated_at DESC, id DESC LIMIT ?",
            VIDEO_COLUMNS
        );
        sqlx::query_as::<_, Video>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list history: {}",
                    e
                )))
            })
    }

    /// Catalog-wide counts
    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        let (channels, videos, downloaded): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM channels),
                (SELECT COUNT(*) FROM videos),
                (SELECT COUNT(*) FROM videos WHERE status = 'completed')
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to compute catalog stats: {}",
                e
            )))
        })?;

        Ok(CatalogStats {
            channels,
            videos,
            downloaded,
        })
    }
}
