//! Episode counters and slot claims.
//!
//! A video's `(season, episode)` is written exactly once, by a conditional
//! update that only touches unplaced rows. The partial unique index on
//! `(channel_id, season_number, episode_number)` turns a lost race into a
//! constraint violation, reported here as [`SlotClaim::Occupied`].

use crate::error::{DatabaseError, DownloadError};
use crate::types::{ChannelId, PlaylistId, VideoId};
use crate::{Error, Result};

use super::{Database, Video, now_ts};

/// Attempts before giving up on finding a free episode number
const MAX_CLAIM_ATTEMPTS: usize = 8;

/// Result of trying to place a video at a slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotClaim {
    /// The video now holds the slot
    Claimed,
    /// Another video of the channel holds the slot
    Occupied,
    /// The video was already placed (or no longer exists)
    AlreadyPlaced,
}

impl Database {
    /// Allocate the next episode number of `(channel, season)`
    ///
    /// A single statement seeds the counter with `max(count, max episode) + 1`
    /// on first use and otherwise advances it past both its own value and any
    /// episode claimed directly. Numbers handed out are never handed out again.
    pub async fn next_episode_number(&self, channel_id: ChannelId, season: u32) -> Result<u32> {
        sqlx::query_scalar(
            r#"
            INSERT INTO episode_counters (channel_id, season_number, last_episode)
            VALUES (?1, ?2, (
                SELECT MAX(COUNT(*), COALESCE(MAX(episode_number), 0)) + 1
                FROM videos
                WHERE channel_id = ?1 AND season_number = ?2
            ))
            ON CONFLICT(channel_id, season_number) DO UPDATE SET
                last_episode = MAX(last_episode, (
                    SELECT COALESCE(MAX(episode_number), 0)
                    FROM videos
                    WHERE channel_id = ?1 AND season_number = ?2
                )) + 1
            RETURNING last_episode
            "#,
        )
        .bind(channel_id)
        .bind(season)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to allocate episode number: {}",
                e
            )))
        })
    }

    /// Place an unplaced video at `(season, episode)`
    pub async fn claim_episode_slot(
        &self,
        video_id: VideoId,
        season: u32,
        episode: u32,
        playlist_id: Option<PlaylistId>,
    ) -> Result<SlotClaim> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET season_number = ?, episode_number = ?, playlist_id = ?, updated_at = ?
            WHERE id = ? AND season_number IS NULL AND episode_number IS NULL
            "#,
        )
        .bind(season)
        .bind(episode)
        .bind(playlist_id)
        .bind(now_ts())
        .bind(video_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(SlotClaim::Claimed),
            Ok(_) => Ok(SlotClaim::AlreadyPlaced),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(SlotClaim::Occupied),
            Err(e) => Err(Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim episode slot: {}",
                e
            )))),
        }
    }

    /// Place `video` at the next free episode of `season`
    ///
    /// Returns the placement the row ends up with, which is the existing one
    /// if the video was already placed.
    pub async fn assign_next_episode(
        &self,
        video: &Video,
        season: u32,
        playlist_id: Option<PlaylistId>,
    ) -> Result<(u32, u32)> {
        if let Some(placement) = video.placement() {
            return Ok(placement);
        }

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let episode = self.next_episode_number(video.channel_id, season).await?;
            match self
                .claim_episode_slot(video.id, season, episode, playlist_id)
                .await?
            {
                SlotClaim::Claimed => return Ok((season, episode)),
                SlotClaim::Occupied => {
                    tracing::debug!(
                        remote_id = %video.remote_id,
                        season,
                        episode,
                        "episode slot taken, allocating again"
                    );
                }
                SlotClaim::AlreadyPlaced => {
                    let current = self.require_video(video.id).await?;
                    return current.placement().ok_or_else(|| {
                        Error::NotFound(format!("video {} lost its placement", video.id))
                    });
                }
            }
        }

        Err(DownloadError::NumberingExhausted {
            remote_id: video.remote_id.clone(),
            season,
        }
        .into())
    }

    /// Episode numbers in use in `(channel, season)`, ascending
    pub async fn season_episodes(&self, channel_id: ChannelId, season: u32) -> Result<Vec<u32>> {
        sqlx::query_scalar(
            r#"
            SELECT episode_number FROM videos
            WHERE channel_id = ? AND season_number = ? AND episode_number IS NOT NULL
            ORDER BY episode_number ASC
            "#,
        )
        .bind(channel_id)
        .bind(season)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list season episodes: {}",
                e
            )))
        })
    }
}
