//! Shared test helpers for creating Tubarr instances against in-process backends.

use crate::config::Config;
use crate::db::{Channel, NewChannel, NewVideo, Video};
use crate::downloader::Tubarr;
use crate::error::FetchError;
use crate::fetch::{
    ChannelInfo, FetchRequest, FetchedVideo, MediaFetcher, RemoteListing, RemotePlaylist,
    RemoteVideo, VideoMetadata,
};
use crate::naming::{DeferredValues, fill_destination};
use crate::types::{ChannelId, DownloadStatus, Quality, VideoId};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

/// What the mock fetcher does for one remote id
#[derive(Clone, Debug)]
pub(crate) enum FetchBehavior {
    /// Write a small file at the destination
    Succeed,
    /// Fail every attempt
    Fail(FetchError),
    /// Fail this many attempts, then succeed
    FailTimes(u32, FetchError),
    /// Wait for the cancellation token
    BlockUntilCancelled,
    /// Wait, then succeed (cancellation still observed)
    Delay(Duration),
    /// Wait, then succeed, ignoring cancellation
    IgnoreCancel(Duration),
}

/// One recorded fetch call
#[derive(Clone, Debug)]
pub(crate) struct FetchCall {
    pub(crate) remote_id: String,
    pub(crate) destination: PathBuf,
    pub(crate) quality: Quality,
}

/// In-process [`MediaFetcher`]; unknown ids succeed
#[derive(Default)]
pub(crate) struct MockFetcher {
    behaviors: Mutex<HashMap<String, FetchBehavior>>,
    metadata: Mutex<HashMap<String, VideoMetadata>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl MockFetcher {
    pub(crate) fn set_behavior(&self, remote_id: &str, behavior: FetchBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(remote_id.to_string(), behavior);
    }

    pub(crate) fn set_metadata(&self, remote_id: &str, metadata: VideoMetadata) {
        self.metadata
            .lock()
            .unwrap()
            .insert(remote_id.to_string(), metadata);
    }

    pub(crate) fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, remote_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.remote_id == remote_id)
            .count()
    }

    /// Behavior for this attempt; `FailTimes` counts down
    fn next_behavior(&self, remote_id: &str) -> FetchBehavior {
        let mut behaviors = self.behaviors.lock().unwrap();
        match behaviors.get_mut(remote_id) {
            Some(FetchBehavior::FailTimes(remaining, error)) if *remaining > 0 => {
                *remaining -= 1;
                FetchBehavior::Fail(error.clone())
            }
            Some(FetchBehavior::FailTimes(..)) | None => FetchBehavior::Succeed,
            Some(behavior) => behavior.clone(),
        }
    }

    async fn write_file(&self, request: &FetchRequest<'_>) -> Result<FetchedVideo, FetchError> {
        let metadata = self
            .metadata
            .lock()
            .unwrap()
            .get(request.remote_id)
            .cloned()
            .unwrap_or_else(|| VideoMetadata {
                title: Some(format!("Title {}", request.remote_id)),
                ..VideoMetadata::default()
            });

        let title = metadata.title.clone().unwrap_or_default();
        let mut path = fill_destination(
            request.destination,
            &DeferredValues {
                title: &title,
                id: request.remote_id,
                upload_date: metadata.upload_date,
            },
        )
        .into_os_string();
        path.push(".mkv");
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Spawn(e.to_string()))?;
        }
        tokio::fs::write(&path, b"video")
            .await
            .map_err(|e| FetchError::Spawn(e.to_string()))?;

        Ok(FetchedVideo { path, metadata })
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchedVideo, FetchError> {
        self.calls.lock().unwrap().push(FetchCall {
            remote_id: request.remote_id.to_string(),
            destination: request.destination.to_path_buf(),
            quality: request.quality,
        });

        match self.next_behavior(request.remote_id) {
            FetchBehavior::Succeed | FetchBehavior::FailTimes(..) => self.write_file(request).await,
            FetchBehavior::Fail(error) => Err(error),
            FetchBehavior::BlockUntilCancelled => {
                cancel.cancelled().await;
                Err(FetchError::Cancelled)
            }
            FetchBehavior::Delay(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => self.write_file(request).await,
                }
            }
            FetchBehavior::IgnoreCancel(delay) => {
                tokio::time::sleep(delay).await;
                self.write_file(request).await
            }
        }
    }
}

/// In-process [`RemoteListing`]
#[derive(Default)]
pub(crate) struct MockListing {
    channels: Mutex<HashMap<String, ChannelInfo>>,
    channel_videos: Mutex<HashMap<String, Vec<RemoteVideo>>>,
    channel_errors: Mutex<HashMap<String, FetchError>>,
    playlists: Mutex<HashMap<String, (RemotePlaylist, Vec<RemoteVideo>)>>,
    channel_playlists: Mutex<HashMap<String, Vec<String>>>,
    playlist_listings: Mutex<HashMap<String, usize>>,
}

impl MockListing {
    /// Register a channel reachable at `url`
    pub(crate) fn add_channel(&self, url: &str, info: ChannelInfo) {
        self.channels.lock().unwrap().insert(url.to_string(), info);
    }

    pub(crate) fn set_channel_videos(&self, remote_channel_id: &str, videos: Vec<RemoteVideo>) {
        self.channel_videos
            .lock()
            .unwrap()
            .insert(remote_channel_id.to_string(), videos);
    }

    /// Make the channel listing fail after yielding its videos
    pub(crate) fn fail_channel_listing(&self, remote_channel_id: &str, error: FetchError) {
        self.channel_errors
            .lock()
            .unwrap()
            .insert(remote_channel_id.to_string(), error);
    }

    pub(crate) fn add_playlist(
        &self,
        remote_channel_id: &str,
        playlist: RemotePlaylist,
        videos: Vec<RemoteVideo>,
    ) {
        self.channel_playlists
            .lock()
            .unwrap()
            .entry(remote_channel_id.to_string())
            .or_default()
            .push(playlist.remote_id.clone());
        self.playlists
            .lock()
            .unwrap()
            .insert(playlist.remote_id.clone(), (playlist, videos));
    }

    /// How many times a playlist's entries were listed
    pub(crate) fn playlist_listings(&self, remote_playlist_id: &str) -> usize {
        self.playlist_listings
            .lock()
            .unwrap()
            .get(remote_playlist_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl RemoteListing for MockListing {
    async fn channel_info(&self, url: &str) -> Result<ChannelInfo, FetchError> {
        self.channels
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Unavailable(url.to_string()))
    }

    fn list_channel_videos(
        &self,
        remote_channel_id: &str,
    ) -> BoxStream<'static, Result<RemoteVideo, FetchError>> {
        let videos = self
            .channel_videos
            .lock()
            .unwrap()
            .get(remote_channel_id)
            .cloned()
            .unwrap_or_default();
        let error = self
            .channel_errors
            .lock()
            .unwrap()
            .get(remote_channel_id)
            .cloned();

        futures::stream::iter(videos.into_iter().map(Ok))
            .chain(futures::stream::iter(error.map(Err)))
            .boxed()
    }

    async fn list_playlist_videos(
        &self,
        remote_playlist_id: &str,
    ) -> Result<Vec<RemoteVideo>, FetchError> {
        *self
            .playlist_listings
            .lock()
            .unwrap()
            .entry(remote_playlist_id.to_string())
            .or_default() += 1;
        self.playlists
            .lock()
            .unwrap()
            .get(remote_playlist_id)
            .map(|(_, videos)| videos.clone())
            .ok_or_else(|| FetchError::Unavailable(remote_playlist_id.to_string()))
    }

    async fn list_channel_playlists(
        &self,
        remote_channel_id: &str,
    ) -> Result<Vec<RemotePlaylist>, FetchError> {
        let ids = self
            .channel_playlists
            .lock()
            .unwrap()
            .get(remote_channel_id)
            .cloned()
            .unwrap_or_default();
        let playlists = self.playlists.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| playlists.get(id).map(|(p, _)| p.clone()))
            .collect())
    }

    async fn playlist_info(&self, remote_playlist_id: &str) -> Result<RemotePlaylist, FetchError> {
        self.playlists
            .lock()
            .unwrap()
            .get(remote_playlist_id)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| FetchError::Unavailable(remote_playlist_id.to_string()))
    }
}

/// Engine plus handles to its in-process backends
pub(crate) struct TestEngine {
    pub(crate) engine: Tubarr,
    pub(crate) fetcher: Arc<MockFetcher>,
    pub(crate) listing: Arc<MockListing>,
    pub(crate) root: PathBuf,
    pub(crate) config: Config,
}

impl TestEngine {
    /// Start another engine over the same database and backends
    pub(crate) async fn restart(&self) -> Tubarr {
        Tubarr::with_backends(
            self.config.clone(),
            self.fetcher.clone(),
            self.listing.clone(),
        )
        .await
        .unwrap()
    }
}

/// Config rooted in `dir`: fast retries, no artwork
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.library.default_download_root = dir.join("library");
    config.library.fetch_artwork = false;
    config.download.max_concurrent_downloads = 3;
    config.download.retry.max_attempts = 2;
    config.download.retry.initial_delay = Duration::from_millis(5);
    config.download.retry.max_delay = Duration::from_millis(20);
    config.download.retry.jitter = false;
    config.download.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Helper to create a test engine with a persistent database.
/// Returns the engine and the tempdir (which must be kept alive).
pub(crate) async fn create_test_engine() -> (TestEngine, TempDir) {
    create_test_engine_with(|_| {}).await
}

/// Like [`create_test_engine`], with a hook to adjust the config first
pub(crate) async fn create_test_engine_with(adjust: impl FnOnce(&mut Config)) -> (TestEngine, TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    adjust(&mut config);

    let fetcher = Arc::new(MockFetcher::default());
    let listing = Arc::new(MockListing::default());
    let engine = Tubarr::with_backends(config.clone(), fetcher.clone(), listing.clone())
        .await
        .unwrap();

    let root = config.download_root().clone();
    (
        TestEngine {
            engine,
            fetcher,
            listing,
            root,
            config,
        },
        temp_dir,
    )
}

pub(crate) fn remote_video(remote_id: &str, title: &str) -> RemoteVideo {
    RemoteVideo {
        remote_id: remote_id.to_string(),
        title: title.to_string(),
        ..RemoteVideo::default()
    }
}

pub(crate) fn remote_playlist(remote_id: &str, title: &str) -> RemotePlaylist {
    RemotePlaylist {
        remote_id: remote_id.to_string(),
        title: title.to_string(),
        ..RemotePlaylist::default()
    }
}

/// Insert a channel row directly, rooted at the test library
pub(crate) async fn seed_channel(t: &TestEngine, remote_id: &str, name: &str) -> Channel {
    let id = t
        .engine
        .db
        .insert_channel(&NewChannel {
            remote_id: remote_id.to_string(),
            name: name.to_string(),
            url: format!("https://www.youtube.com/channel/{}", remote_id),
            thumbnail: None,
            description: None,
            monitored: true,
            download_root: t.root.clone(),
            quality: Quality::P1080,
        })
        .await
        .unwrap();
    t.engine.db.require_channel(id).await.unwrap()
}

/// Insert a video row directly
pub(crate) async fn seed_video(
    t: &TestEngine,
    channel_id: ChannelId,
    remote_id: &str,
    status: DownloadStatus,
) -> Video {
    let id = t
        .engine
        .db
        .insert_video(&NewVideo {
            remote_id: remote_id.to_string(),
            channel_id,
            title: format!("Video {}", remote_id),
            published_at: None,
            duration_secs: None,
            status,
            file_path: None,
            file_size: None,
        })
        .await
        .unwrap();
    t.engine.db.require_video(id).await.unwrap()
}

/// Poll until the video reaches `status` (5 second limit)
pub(crate) async fn wait_for_status(engine: &Tubarr, id: VideoId, status: DownloadStatus) -> Video {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let video = engine.db.require_video(id).await.unwrap();
            if video.status == status && !engine.is_in_flight(&video.remote_id).await {
                return video;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("video {id} never reached {status}"))
}

/// Poll until no task holds `remote_id`
pub(crate) async fn wait_for_release(engine: &Tubarr, remote_id: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.is_in_flight(remote_id).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{remote_id} never left the registry"));
}

/// Poll until the video's task has started fetching
pub(crate) async fn wait_for_fetch(fetcher: &MockFetcher, remote_id: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while fetcher.call_count(remote_id) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{remote_id} was never fetched"));
}
