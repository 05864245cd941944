//! Remote capabilities: media fetch and remote listing
//!
//! Both are traits so the engine can run against the `yt-dlp` CLI
//! ([`crate::ytdlp::YtDlp`]) or an in-process double in tests.

use crate::error::FetchError;
use crate::types::Quality;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Metadata reported by the fetch capability for a downloaded video
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video title
    pub title: Option<String>,
    /// Upload date
    pub upload_date: Option<NaiveDate>,
    /// Duration in seconds
    pub duration_secs: Option<i64>,
    /// Description text
    pub description: Option<String>,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
}

/// One media fetch
#[derive(Clone, Copy, Debug)]
pub struct FetchRequest<'a> {
    /// Remote video id
    pub remote_id: &'a str,
    /// Absolute destination without extension; may contain deferred tokens
    pub destination: &'a Path,
    /// Quality preference
    pub quality: Quality,
}

/// Result of a successful fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedVideo {
    /// Final file path, extension included
    pub path: PathBuf,
    /// Metadata of the fetched video
    pub metadata: VideoMetadata,
}

/// Downloads one remote video to a local path
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch `request.remote_id` to `request.destination`
    ///
    /// Implementations must return [`FetchError::Cancelled`] promptly once
    /// `cancel` fires.
    async fn fetch(
        &self,
        request: &FetchRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchedVideo, FetchError>;
}

/// A video entry in a remote listing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVideo {
    /// Remote video id
    pub remote_id: String,
    /// Title
    pub title: String,
    /// Upload date, when the listing carries it
    pub upload_date: Option<NaiveDate>,
    /// Duration in seconds
    pub duration_secs: Option<i64>,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
}

/// A playlist entry in a remote channel listing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    /// Remote playlist id
    pub remote_id: String,
    /// Title
    pub title: String,
    /// Number of entries, when known
    pub video_count: Option<u32>,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
}

/// Channel metadata resolved from a URL
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Remote channel id
    pub remote_id: String,
    /// Display name
    pub name: String,
    /// Canonical channel URL
    pub url: String,
    /// Avatar/banner URL
    pub thumbnail: Option<String>,
    /// Channel description
    pub description: Option<String>,
}

/// Reads channel and playlist listings from the remote source
#[async_trait]
pub trait RemoteListing: Send + Sync {
    /// Resolve a channel URL (or handle URL) to its metadata
    async fn channel_info(&self, url: &str) -> Result<ChannelInfo, FetchError>;

    /// Every video of a channel, newest first
    ///
    /// The stream is lazy and finite; calling again restarts the listing.
    fn list_channel_videos(
        &self,
        remote_channel_id: &str,
    ) -> BoxStream<'static, Result<RemoteVideo, FetchError>>;

    /// The entries of a playlist in playlist order
    async fn list_playlist_videos(
        &self,
        remote_playlist_id: &str,
    ) -> Result<Vec<RemoteVideo>, FetchError>;

    /// The playlists a channel publishes
    async fn list_channel_playlists(
        &self,
        remote_channel_id: &str,
    ) -> Result<Vec<RemotePlaylist>, FetchError>;

    /// Metadata of a single playlist
    async fn playlist_info(&self, remote_playlist_id: &str) -> Result<RemotePlaylist, FetchError>;
}
