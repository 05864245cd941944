//! Channel and playlist sync -- remote listings into catalog rows and download tasks.

use crate::artwork::POSTER;
use crate::db::{Channel, NewChannel, NewPlaylist, NewVideo, Playlist};
use crate::error::{Error, Result};
use crate::fetch::{RemotePlaylist, RemoteVideo};
use crate::naming::{self, sidecar};
use crate::numbering::enumerate_listing;
use crate::types::{
    ChannelId, DispatchAck, DownloadStatus, Event, PlaylistId, Quality, SyncReport, VideoId,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::Tubarr;
use super::download_task::PlaylistSlot;

/// Parameters for [`Tubarr::add_channel`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddChannel {
    /// Channel URL (or handle URL)
    pub url: String,
    /// Library root; the configured default when `None`
    #[serde(default)]
    pub download_root: Option<PathBuf>,
    /// Quality preference; the configured default when `None`
    #[serde(default)]
    pub quality: Option<Quality>,
    /// Download new uploads automatically
    #[serde(default = "default_true")]
    pub monitored: bool,
    /// Download the whole back catalog after the first sync
    #[serde(default)]
    pub download_all: bool,
}

fn default_true() -> bool {
    true
}

impl AddChannel {
    /// Monitored channel at `url` with default root and quality
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            download_root: None,
            quality: None,
            monitored: true,
            download_all: false,
        }
    }
}

/// Per-playlist overrides for [`Tubarr::monitor_playlist`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlaylistOptions {
    /// Quality override
    #[serde(default)]
    pub quality: Option<Quality>,
    /// Library root override
    #[serde(default)]
    pub download_root: Option<PathBuf>,
}

/// A remote playlist annotated with its catalog row, if monitored
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistListing {
    /// Remote metadata
    pub remote: RemotePlaylist,
    /// Catalog row, when the playlist has been added
    pub playlist: Option<Playlist>,
}

impl PlaylistListing {
    /// Whether the playlist is in the catalog and monitored
    pub fn is_monitored(&self) -> bool {
        self.playlist.as_ref().is_some_and(|p| p.monitored)
    }
}

fn listing_video(channel_id: ChannelId, entry: &RemoteVideo) -> NewVideo {
    NewVideo {
        remote_id: entry.remote_id.clone(),
        channel_id,
        title: if entry.title.is_empty() {
            entry.remote_id.clone()
        } else {
            entry.title.clone()
        },
        published_at: entry
            .upload_date
            .and_then(super::download_task::date_timestamp),
        duration_secs: entry.duration_secs,
        status: DownloadStatus::Available,
        file_path: None,
        file_size: None,
    }
}

impl Tubarr {
    /// Add a channel to the catalog
    ///
    /// Resolves the channel through the listing capability, stores it, writes
    /// the show sidecar and poster (best-effort), then syncs the listing in
    /// the background. With `download_all` every video found by that first
    /// sync is downloaded.
    ///
    /// # Errors
    ///
    /// - [`Error::Fetch`] if the channel cannot be resolved
    /// - a constraint violation if the channel is already in the catalog
    pub async fn add_channel(&self, request: AddChannel) -> Result<Channel> {
        self.ensure_accepting()?;

        let info = self.backends.listing.channel_info(&request.url).await?;
        let download_root = request
            .download_root
            .unwrap_or_else(|| self.config.download_root().clone());
        // fail before inserting if the name cannot become a directory
        naming::show_dir(&info.name)?;

        let channel_id = self
            .db
            .insert_channel(&NewChannel {
                remote_id: info.remote_id.clone(),
                name: info.name.clone(),
                url: info.url.clone(),
                thumbnail: info.thumbnail.clone(),
                description: info.description.clone(),
                monitored: request.monitored,
                download_root,
                quality: request
                    .quality
                    .unwrap_or(self.config.library.default_quality),
            })
            .await?;
        let channel = self.db.require_channel(channel_id).await?;

        tracing::info!(channel_id = channel.id.get(), name = %channel.name, "channel added");
        self.emit_event(Event::ChannelAdded {
            channel_id: channel.id,
            name: channel.name.clone(),
        });

        self.write_show_files(&channel).await;

        let engine = self.clone();
        let download_all = request.download_all;
        tokio::spawn(async move {
            if let Err(e) = engine.initial_sync(channel_id, download_all).await {
                tracing::error!(channel_id = channel_id.get(), error = %e, "initial channel sync failed");
            }
        });

        Ok(channel)
    }

    async fn initial_sync(&self, channel_id: ChannelId, download_all: bool) -> Result<()> {
        self.sync_channel(channel_id).await?;
        if download_all {
            self.download_channel(channel_id).await?;
        }
        Ok(())
    }

    /// Show sidecar and channel poster, both best-effort
    async fn write_show_files(&self, channel: &Channel) {
        let dir = match channel.directory() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(channel_id = channel.id.get(), error = %e, "no channel directory");
                return;
            }
        };

        if self.config.library.write_sidecars {
            let info = sidecar::ShowInfo {
                title: channel.name.clone(),
                plot: channel.description.clone(),
                premiered: DateTime::<Utc>::from_timestamp(channel.added_at, 0)
                    .map(|dt| dt.date_naive()),
            };
            let written = match sidecar::show_document(&info) {
                Ok(doc) => sidecar::write_if_absent(&dir.join(sidecar::TVSHOW_NFO), doc).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                tracing::warn!(channel_id = channel.id.get(), error = %e, "failed to write show sidecar");
            }
        }

        if self.config.library.fetch_artwork {
            if let Some(url) = &channel.thumbnail {
                if let Err(e) = self
                    .backends
                    .artwork
                    .download_if_absent(url, &dir.join(POSTER))
                    .await
                {
                    tracing::warn!(channel_id = channel.id.get(), error = %e, "failed to fetch channel poster");
                }
            }
        }
    }

    /// Sync a channel's remote listing into the catalog
    ///
    /// Unknown videos are stored as `available` without a season or episode
    /// and counted as discovered. Known videos get a missing duration filled
    /// in. On every sync after the first, a monitored channel dispatches its
    /// newly discovered videos (if `download_new_videos` is on). Rows left
    /// `queued` with no task behind them are dispatched again.
    ///
    /// # Errors
    ///
    /// [`Error::Fetch`] if the listing fails; rows stored before the failure
    /// are kept.
    pub async fn sync_channel(&self, channel_id: ChannelId) -> Result<SyncReport> {
        let channel = self.db.require_channel(channel_id).await?;
        let first_sync = channel.last_sync.is_none();
        tracing::info!(channel_id = channel_id.get(), first_sync, "channel sync started");

        let mut report = SyncReport::default();
        let mut discovered: Vec<VideoId> = Vec::new();
        let mut stranded = Vec::new();

        let mut listing = self.backends.listing.list_channel_videos(&channel.remote_id);
        while let Some(entry) = listing.next().await {
            let entry = entry?;
            match self
                .db
                .insert_video_if_absent(&listing_video(channel.id, &entry))
                .await?
            {
                Some(id) => {
                    report.discovered += 1;
                    discovered.push(id);
                }
                None => {
                    let Some(existing) = self.db.get_video_by_remote_id(&entry.remote_id).await?
                    else {
                        continue;
                    };
                    if let (None, Some(duration)) = (existing.duration_secs, entry.duration_secs) {
                        self.db.fill_missing_duration(existing.id, duration).await?;
                    }
                    if existing.status == DownloadStatus::Queued
                        && !self.is_in_flight(&existing.remote_id).await
                    {
                        stranded.push(existing);
                    }
                }
            }
        }

        let auto_download =
            !first_sync && channel.monitored && self.config.sync.download_new_videos;
        if auto_download {
            for id in discovered {
                let video = self.db.require_video(id).await?;
                let ack = self.dispatch(&video, None).await?.ack;
                report.record_dispatch(&ack);
            }
        }
        for video in stranded {
            tracing::debug!(remote_id = %video.remote_id, "re-dispatching stranded queued video");
            let ack = self.dispatch(&video, None).await?.ack;
            report.record_dispatch(&ack);
        }

        self.db.touch_channel_sync(channel.id).await?;
        tracing::info!(
            channel_id = channel_id.get(),
            discovered = report.discovered,
            dispatched = report.dispatched,
            "channel sync complete"
        );
        self.emit_event(Event::ChannelSynced {
            channel_id,
            report,
        });
        Ok(report)
    }

    /// Sync every monitored channel
    ///
    /// One channel failing does not stop the others; each gets its own result.
    pub async fn sync_all_channels(&self) -> Result<Vec<(ChannelId, Result<SyncReport>)>> {
        let channels = self.db.list_monitored_channels().await?;
        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            let result = self.sync_channel(channel.id).await;
            if let Err(e) = &result {
                tracing::error!(channel_id = channel.id.get(), error = %e, "channel sync failed");
            }
            results.push((channel.id, result));
        }
        Ok(results)
    }

    /// Dispatch every video of a channel that is not on disk
    pub async fn download_channel(&self, channel_id: ChannelId) -> Result<SyncReport> {
        self.db.require_channel(channel_id).await?;
        let mut report = SyncReport::default();
        for video in self.db.list_videos_for_channel(channel_id).await? {
            if video.status == DownloadStatus::Completed {
                report.skipped += 1;
                continue;
            }
            let ack = self.dispatch(&video, None).await?.ack;
            report.record_dispatch(&ack);
        }
        Ok(report)
    }

    /// Sync a playlist and download its entries in listing order
    ///
    /// The listing is fetched once. Entry `n` (1-based) is placed at episode
    /// `n` of the playlist's season unless it was placed before. Tasks run
    /// one after another; a failed entry is counted and the next one starts.
    pub async fn sync_playlist(&self, playlist_id: PlaylistId) -> Result<SyncReport> {
        self.ensure_accepting()?;
        self.template.validate()?;

        let playlist = self.db.require_playlist(playlist_id).await?;
        let channel = self.db.require_channel(playlist.channel_id).await?;
        tracing::info!(
            playlist_id = playlist_id.get(),
            season = playlist.season_number,
            "playlist sync started"
        );

        let entries = self
            .backends
            .listing
            .list_playlist_videos(&playlist.remote_id)
            .await?;

        let mut report = SyncReport::default();
        for (position, entry) in enumerate_listing(&entries) {
            if self
                .db
                .insert_video_if_absent(&listing_video(channel.id, entry))
                .await?
                .is_some()
            {
                report.discovered += 1;
            }
            let Some(video) = self.db.get_video_by_remote_id(&entry.remote_id).await? else {
                continue;
            };
            if video.status == DownloadStatus::Completed {
                report.skipped += 1;
                continue;
            }

            let slot = PlaylistSlot {
                playlist: playlist.clone(),
                position,
            };
            let dispatched = self.dispatch(&video, Some(slot)).await?;
            match dispatched.ack {
                DispatchAck::Queued(_) => report.record(&dispatched.outcome().await),
                ack => report.record_dispatch(&ack),
            }
        }

        self.db.touch_playlist_sync(playlist.id).await?;
        tracing::info!(
            playlist_id = playlist_id.get(),
            discovered = report.discovered,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "playlist sync complete"
        );
        self.emit_event(Event::PlaylistSynced {
            playlist_id,
            report,
        });
        Ok(report)
    }

    /// Start monitoring a remote playlist of a channel
    ///
    /// The playlist is mapped to the smallest free season of the channel.
    pub async fn monitor_playlist(
        &self,
        channel_id: ChannelId,
        remote_playlist_id: &str,
        options: PlaylistOptions,
    ) -> Result<Playlist> {
        let channel = self.db.require_channel(channel_id).await?;
        if let Some(existing) = self.db.get_playlist_by_remote_id(remote_playlist_id).await? {
            if existing.channel_id == channel.id {
                self.db.set_playlist_monitored(existing.id, true).await?;
                return self.db.require_playlist(existing.id).await;
            }
            return Err(Error::Other(format!(
                "playlist {} belongs to channel {}",
                remote_playlist_id, existing.channel_id
            )));
        }

        let info = self.backends.listing.playlist_info(remote_playlist_id).await?;
        let playlist = self
            .db
            .insert_playlist(&NewPlaylist {
                remote_id: info.remote_id,
                channel_id: channel.id,
                title: info.title,
                monitored: true,
                quality: options.quality,
                download_root: options.download_root,
            })
            .await?;

        tracing::info!(
            playlist_id = playlist.id.get(),
            channel_id = channel.id.get(),
            season = playlist.season_number,
            "playlist monitored"
        );
        Ok(playlist)
    }

    /// The channel's remote playlists, annotated with their catalog rows
    pub async fn channel_playlists(&self, channel_id: ChannelId) -> Result<Vec<PlaylistListing>> {
        let channel = self.db.require_channel(channel_id).await?;
        let remote = self
            .backends
            .listing
            .list_channel_playlists(&channel.remote_id)
            .await?;
        let known = self.db.list_playlists(channel.id).await?;

        Ok(remote
            .into_iter()
            .map(|remote| {
                let playlist = known
                    .iter()
                    .find(|p| p.remote_id == remote.remote_id)
                    .cloned();
                PlaylistListing { remote, playlist }
            })
            .collect())
    }

    /// Toggle whether a channel's new uploads are downloaded
    pub async fn set_channel_monitored(&self, channel_id: ChannelId, monitored: bool) -> Result<()> {
        if !self.db.set_channel_monitored(channel_id, monitored).await? {
            return Err(Error::NotFound(format!("channel {}", channel_id)));
        }
        Ok(())
    }

    /// Toggle whether a playlist is synced
    pub async fn set_playlist_monitored(
        &self,
        playlist_id: PlaylistId,
        monitored: bool,
    ) -> Result<()> {
        if !self.db.set_playlist_monitored(playlist_id, monitored).await? {
            return Err(Error::NotFound(format!("playlist {}", playlist_id)));
        }
        Ok(())
    }

    /// Remove a channel with its playlists and videos
    ///
    /// Running downloads of the channel are cancelled. Files stay on disk.
    pub async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        let videos = self.db.list_videos_for_channel(channel_id).await?;
        {
            let in_flight = self.dispatch.in_flight.lock().await;
            for video in &videos {
                if let Some(token) = in_flight.get(&video.remote_id) {
                    token.cancel();
                }
            }
        }

        if !self.db.delete_channel(channel_id).await? {
            return Err(Error::NotFound(format!("channel {}", channel_id)));
        }
        tracing::info!(channel_id = channel_id.get(), "channel deleted");
        Ok(())
    }

    /// Stop monitoring a playlist and free its season
    ///
    /// Videos placed through it lose their numbering; files stay on disk.
    pub async fn delete_playlist(&self, playlist_id: PlaylistId) -> Result<()> {
        if !self.db.delete_playlist(playlist_id).await? {
            return Err(Error::NotFound(format!("playlist {}", playlist_id)));
        }
        tracing::info!(playlist_id = playlist_id.get(), "playlist deleted");
        Ok(())
    }
}
