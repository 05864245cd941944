//! Database layer for tubarr
//!
//! SQLite persistence for the catalog: channels, playlists, videos and the
//! per-season episode counters.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`channels`] — Channel CRUD
//! - [`playlists`] — Playlist CRUD and season allocation
//! - [`videos`] — Video CRUD, compare-and-set status transitions, read-side queries
//! - [`numbering`] — Episode counters and slot claims
//!
//! Every status write is a compare-and-set: the `UPDATE` names the statuses
//! it may move the row from and reports whether a row changed.

use crate::error::Result;
use crate::naming;
use crate::types::{ChannelId, DownloadStatus, PlaylistId, Quality, VideoId};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod channels;
mod migrations;
mod numbering;
mod playlists;
mod videos;

pub use numbering::SlotClaim;

/// Current unix time in seconds
pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// New channel to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewChannel {
    /// Remote channel id
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Remote URL
    pub url: String,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    /// Channel description
    pub description: Option<String>,
    /// Whether new uploads are downloaded automatically
    pub monitored: bool,
    /// Library root the channel directory lives in
    pub download_root: PathBuf,
    /// Quality preference
    pub quality: Quality,
}

/// Channel record from database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
    /// Unique database ID
    pub id: ChannelId,
    /// Remote channel id
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Remote URL
    pub url: String,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    /// Channel description
    pub description: Option<String>,
    /// Whether new uploads are downloaded automatically
    pub monitored: bool,
    /// Library root the channel directory lives in
    pub download_root: String,
    /// Quality preference
    pub quality: Quality,
    /// Unix timestamp of the last completed sync
    pub last_sync: Option<i64>,
    /// Unix timestamp when the channel was added
    pub added_at: i64,
}

impl Channel {
    /// The channel directory: `<download root>/<sanitized name>`
    pub fn directory(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(&self.download_root).join(naming::show_dir(&self.name)?))
    }
}

/// New playlist to be inserted into the database
///
/// The season number is allocated on insert.
#[derive(Debug, Clone)]
pub struct NewPlaylist {
    /// Remote playlist id
    pub remote_id: String,
    /// Owning channel
    pub channel_id: ChannelId,
    /// Title (used as the season name)
    pub title: String,
    /// Whether the playlist is synced
    pub monitored: bool,
    /// Quality override
    pub quality: Option<Quality>,
    /// Library root override
    pub download_root: Option<PathBuf>,
}

/// Playlist record from database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Playlist {
    /// Unique database ID
    pub id: PlaylistId,
    /// Remote playlist id
    pub remote_id: String,
    /// Owning channel
    pub channel_id: ChannelId,
    /// Title (used as the season name)
    pub title: String,
    /// Whether the playlist is synced
    pub monitored: bool,
    /// Season this playlist maps to (never 0)
    pub season_number: u32,
    /// Quality override
    pub quality: Option<Quality>,
    /// Library root override
    pub download_root: Option<String>,
    /// Unix timestamp of the last completed sync
    pub last_sync: Option<i64>,
    /// Unix timestamp when the playlist was added
    pub added_at: i64,
}

impl Playlist {
    /// Effective quality: the override, else the channel's
    pub fn effective_quality(&self, channel: &Channel) -> Quality {
        self.quality.unwrap_or(channel.quality)
    }

    /// Effective library root: the override, else the channel's
    pub fn effective_root(&self, channel: &Channel) -> PathBuf {
        PathBuf::from(
            self.download_root
                .as_deref()
                .unwrap_or(channel.download_root.as_str()),
        )
    }
}

/// New video to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewVideo {
    /// Remote video id
    pub remote_id: String,
    /// Owning channel
    pub channel_id: ChannelId,
    /// Title
    pub title: String,
    /// Unix timestamp of publication
    pub published_at: Option<i64>,
    /// Duration in seconds
    pub duration_secs: Option<i64>,
    /// Initial status
    pub status: DownloadStatus,
    /// File path, for rows created from files on disk
    pub file_path: Option<String>,
    /// File size in bytes
    pub file_size: Option<i64>,
}

/// Video record from database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Video {
    /// Unique database ID
    pub id: VideoId,
    /// Remote video id (unique across the catalog)
    pub remote_id: String,
    /// Owning channel
    pub channel_id: ChannelId,
    /// Playlist this video was placed through
    pub playlist_id: Option<PlaylistId>,
    /// Title
    pub title: String,
    /// Unix timestamp of publication
    pub published_at: Option<i64>,
    /// Duration in seconds
    pub duration_secs: Option<i64>,
    /// Season (0 = specials)
    pub season_number: Option<u32>,
    /// Episode within the season
    pub episode_number: Option<u32>,
    /// Download status
    pub status: DownloadStatus,
    /// Resolved file path
    pub file_path: Option<String>,
    /// File size in bytes
    pub file_size: Option<i64>,
    /// Last download error
    pub error_message: Option<String>,
    /// Unix timestamp when the row was created
    pub created_at: i64,
    /// Unix timestamp of the last change
    pub updated_at: i64,
}

impl Video {
    /// `(season, episode)` if the video has been placed
    pub fn placement(&self) -> Option<(u32, u32)> {
        self.season_number.zip(self.episode_number)
    }
}

/// Metadata columns updated after a fetch
#[derive(Debug, Clone, Default)]
pub struct VideoMetadataUpdate {
    /// New title
    pub title: Option<String>,
    /// New publication time
    pub published_at: Option<i64>,
    /// New duration
    pub duration_secs: Option<i64>,
}

/// One page of a channel's videos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPage {
    /// Rows on this page
    pub videos: Vec<Video>,
    /// Rows matching the filter
    pub total: i64,
    /// More rows after this page
    pub has_more: bool,
}

/// Database handle for tubarr
pub struct Database {
    pool: SqlitePool,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
