//! Download control -- request, wait, cancel, retry, delete.

use crate::db::NewVideo;
use crate::error::{DownloadError, Error, Result};
use crate::naming::sidecar::episode_path;
use crate::types::{ChannelId, DispatchAck, DownloadStatus, Event, TaskOutcome, VideoId};
use std::path::PathBuf;

use super::Tubarr;

impl Tubarr {
    /// Request a download of a catalogued video
    ///
    /// Returns as soon as the task is dispatched; the download runs in the
    /// background and its result is recorded on the row and broadcast as an
    /// event. Fetch failures never surface here.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the video does not exist
    /// - [`Error::InvalidTemplate`] if the naming template cannot produce a filename
    /// - [`Error::ShuttingDown`] after [`Tubarr::shutdown`]
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use tubarr::*;
    /// # async fn example(engine: Tubarr, id: VideoId) -> Result<()> {
    /// match engine.request_download(id).await? {
    ///     DispatchAck::Queued(_) => println!("queued"),
    ///     DispatchAck::AlreadyInFlight(_) => println!("already downloading"),
    ///     DispatchAck::AlreadyCompleted(_) => println!("already on disk"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request_download(&self, video_id: VideoId) -> Result<DispatchAck> {
        self.ensure_accepting()?;
        self.template.validate()?;

        let video = self.db.require_video(video_id).await?;
        Ok(self.dispatch(&video, None).await?.ack)
    }

    /// Request a download by remote id, creating the row if it is unknown
    ///
    /// A new row gets the remote id as a placeholder title; the fetch replaces
    /// it with the real one.
    pub async fn request_remote_download(
        &self,
        channel_id: ChannelId,
        remote_id: &str,
    ) -> Result<DispatchAck> {
        self.ensure_accepting()?;
        self.template.validate()?;

        let channel = self.db.require_channel(channel_id).await?;
        let video = match self.db.get_video_by_remote_id(remote_id).await? {
            Some(video) => video,
            None => {
                self.db
                    .insert_video_if_absent(&NewVideo {
                        remote_id: remote_id.to_string(),
                        channel_id: channel.id,
                        title: remote_id.to_string(),
                        published_at: None,
                        duration_secs: None,
                        status: DownloadStatus::Pending,
                        file_path: None,
                        file_size: None,
                    })
                    .await?;
                self.db
                    .get_video_by_remote_id(remote_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("video {}", remote_id)))?
            }
        };

        if video.channel_id != channel.id {
            tracing::warn!(
                remote_id,
                requested_channel = channel.id.get(),
                owning_channel = video.channel_id.get(),
                "video belongs to another channel, downloading it there"
            );
        }

        Ok(self.dispatch(&video, None).await?.ack)
    }

    /// Download a video and wait for the task to finish
    ///
    /// Returns [`TaskOutcome::Skipped`] when the video was already on disk or
    /// owned by another task.
    pub async fn download_and_wait(&self, video_id: VideoId) -> Result<TaskOutcome> {
        self.ensure_accepting()?;
        self.template.validate()?;

        let video = self.db.require_video(video_id).await?;
        Ok(self.dispatch(&video, None).await?.outcome().await)
    }

    /// Cancel a running or queued download
    ///
    /// Returns whether a task was signalled. The task observes the token at
    /// its next fetch boundary and returns the row to `pending`.
    pub async fn cancel_download(&self, video_id: VideoId) -> Result<bool> {
        let video = self.db.require_video(video_id).await?;
        let in_flight = self.dispatch.in_flight.lock().await;
        match in_flight.get(&video.remote_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(video_id = video_id.get(), "cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-dispatch a failed download
    ///
    /// The video keeps its season and episode.
    pub async fn retry_download(&self, video_id: VideoId) -> Result<DispatchAck> {
        self.ensure_accepting()?;

        let video = self.db.require_video(video_id).await?;
        if video.status != DownloadStatus::Failed {
            return Err(DownloadError::InvalidState {
                remote_id: video.remote_id,
                operation: "retry".to_string(),
                current: video.status,
            }
            .into());
        }
        Ok(self.dispatch(&video, None).await?.ack)
    }

    /// Remove a video from the catalog and delete its file
    ///
    /// A running task is cancelled first. File removal is best-effort: a file
    /// that is already gone or cannot be removed is logged.
    pub async fn delete_video(&self, video_id: VideoId) -> Result<()> {
        let video = self.db.require_video(video_id).await?;

        if let Some(token) = self.dispatch.in_flight.lock().await.get(&video.remote_id) {
            token.cancel();
        }

        self.db.delete_video(video_id).await?;

        if let Some(path) = video.file_path.as_deref().map(PathBuf::from) {
            remove_best_effort(&path).await;
            remove_best_effort(&episode_path(&path)).await;
        }

        tracing::info!(video_id = video_id.get(), remote_id = %video.remote_id, "video deleted");
        self.emit_event(Event::VideoDeleted {
            video_id,
            remote_id: video.remote_id,
        });
        Ok(())
    }
}

async fn remove_best_effort(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}
