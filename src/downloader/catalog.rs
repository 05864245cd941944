//! Read-side catalog queries.

use crate::db::{Channel, Playlist, Video, VideoPage};
use crate::error::Result;
use crate::types::{CatalogStats, ChannelId, VideoId, VideoQuery};

use super::Tubarr;

/// Default history page size
const HISTORY_LIMIT: u32 = 50;

impl Tubarr {
    /// Get a channel
    pub async fn get_channel(&self, id: ChannelId) -> Result<Channel> {
        self.db.require_channel(id).await
    }

    /// All channels, most recently added first
    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        self.db.list_channels().await
    }

    /// A channel's monitored and unmonitored playlists, by season
    pub async fn list_playlists(&self, channel_id: ChannelId) -> Result<Vec<Playlist>> {
        self.db.require_channel(channel_id).await?;
        self.db.list_playlists(channel_id).await
    }

    /// Get a video
    pub async fn get_video(&self, id: VideoId) -> Result<Video> {
        self.db.require_video(id).await
    }

    /// One page of a channel's videos
    pub async fn list_channel_videos(
        &self,
        channel_id: ChannelId,
        query: VideoQuery,
    ) -> Result<VideoPage> {
        self.db.require_channel(channel_id).await?;
        self.db.list_channel_videos(channel_id, query).await
    }

    /// Videos waiting for or undergoing a download
    pub async fn list_queue(&self) -> Result<Vec<Video>> {
        self.db.list_queue().await
    }

    /// Most recent completed downloads (50 unless `limit` is given)
    pub async fn list_history(&self, limit: Option<u32>) -> Result<Vec<Video>> {
        self.db.list_history(limit.unwrap_or(HISTORY_LIMIT)).await
    }

    /// Catalog-wide counts
    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        self.db.catalog_stats().await
    }
}
