//! Download task context -- shared state, per-step results and registry cleanup.

use crate::db::{Channel, Playlist};
use crate::types::{DownloadStatus, Event, TaskOutcome, TaskStep, VideoId};
use crate::types::Quality;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::super::Tubarr;

/// Playlist context handed to a task by a playlist sync
#[derive(Clone, Debug)]
pub(crate) struct PlaylistSlot {
    /// Playlist the video is downloaded through
    pub(crate) playlist: Playlist,
    /// 1-based position in the playlist listing
    pub(crate) position: u32,
}

/// Where a video lands in the library
#[derive(Clone, Debug)]
pub(super) struct Placement {
    pub(super) season: u32,
    pub(super) episode: u32,
    pub(super) playlist: Option<Playlist>,
}

impl Placement {
    pub(super) fn quality(&self, channel: &Channel) -> Quality {
        match &self.playlist {
            Some(playlist) => playlist.effective_quality(channel),
            None => channel.quality,
        }
    }

    pub(super) fn root(&self, channel: &Channel) -> PathBuf {
        match &self.playlist {
            Some(playlist) => playlist.effective_root(channel),
            None => PathBuf::from(&channel.download_root),
        }
    }

    pub(super) fn season_name(&self) -> Option<&str> {
        self.playlist.as_ref().map(|p| p.title.as_str())
    }
}

/// A fatal step failed; the row ends `failed`
#[derive(Debug)]
pub(super) struct StepFailure {
    pub(super) step: TaskStep,
    pub(super) error: String,
}

impl StepFailure {
    pub(super) fn new(step: TaskStep, error: impl Display) -> Self {
        Self {
            step,
            error: error.to_string(),
        }
    }
}

/// A best-effort step did not succeed; the download still counts
#[derive(Debug)]
pub(super) struct StepWarning {
    pub(super) step: TaskStep,
    pub(super) error: String,
}

impl StepWarning {
    pub(super) fn new(step: TaskStep, error: impl Display) -> Self {
        Self {
            step,
            error: error.to_string(),
        }
    }
}

pub(super) type StepResult<T> = std::result::Result<T, StepFailure>;

/// Shared context for a single download task
pub(crate) struct DownloadTaskContext {
    pub(crate) video_id: VideoId,
    pub(crate) remote_id: String,
    pub(crate) slot: Option<PlaylistSlot>,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) engine: Tubarr,
}

impl DownloadTaskContext {
    /// Remove this task from the in-flight registry
    ///
    /// Runs after the terminal status is written, so a later dispatch never
    /// sees an in-flight row without its owner.
    pub(super) async fn release(&self) {
        let mut in_flight = self.engine.dispatch.in_flight.lock().await;
        in_flight.remove(&self.remote_id);
    }

    /// Record a fatal step failure and emit the failure event
    pub(super) async fn fail(&self, failure: StepFailure) -> TaskOutcome {
        tracing::error!(
            video_id = self.video_id.get(),
            remote_id = %self.remote_id,
            step = %failure.step,
            error = %failure.error,
            "download failed"
        );

        match self.engine.db.mark_failed(self.video_id, &failure.error).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                video_id = self.video_id.get(),
                "video row changed before the failure could be recorded"
            ),
            Err(e) => tracing::error!(
                video_id = self.video_id.get(),
                error = %e,
                "failed to record download failure"
            ),
        }

        self.engine.emit_event(Event::DownloadFailed {
            video_id: self.video_id,
            remote_id: self.remote_id.clone(),
            step: failure.step,
            error: failure.error.clone(),
        });

        TaskOutcome::Failed {
            video_id: self.video_id,
            step: failure.step,
            error: failure.error,
        }
    }

    /// Release the row after the cancellation token fired
    ///
    /// A user cancellation returns the row to `pending`. A shutdown leaves it
    /// `queued` so the next session picks it up again.
    pub(super) async fn cancelled(&self) -> TaskOutcome {
        let shutting_down = !self.engine.dispatch.accepting_new.load(Ordering::SeqCst);
        let target = if shutting_down {
            DownloadStatus::Queued
        } else {
            DownloadStatus::Pending
        };
        let from: &[DownloadStatus] = if shutting_down {
            &[DownloadStatus::Downloading]
        } else {
            &[DownloadStatus::Queued, DownloadStatus::Downloading]
        };

        if let Err(e) = self
            .engine
            .db
            .transition_status(self.video_id, from, target)
            .await
        {
            tracing::error!(video_id = self.video_id.get(), error = %e, "failed to release cancelled download");
        }

        tracing::info!(
            video_id = self.video_id.get(),
            remote_id = %self.remote_id,
            status = %target,
            "download cancelled"
        );
        self.engine.emit_event(Event::DownloadCancelled {
            video_id: self.video_id,
            remote_id: self.remote_id.clone(),
        });

        TaskOutcome::Cancelled {
            video_id: self.video_id,
        }
    }

    /// Log a best-effort step that did not succeed
    pub(super) fn warn(&self, warning: &StepWarning) {
        tracing::warn!(
            video_id = self.video_id.get(),
            remote_id = %self.remote_id,
            step = %warning.step,
            error = %warning.error,
            "best-effort step failed"
        );
    }
}
