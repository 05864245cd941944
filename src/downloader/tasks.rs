//! Download task dispatch.
//!
//! [`Tubarr::dispatch`] is the only way a video enters `queued`. It claims the
//! remote id in the in-flight registry and compare-and-sets the row under the
//! registry lock, so two requests for one video can never both win.

use crate::db::Video;
use crate::error::Result;
use crate::types::{DispatchAck, DownloadStatus, Event, TaskOutcome};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Tubarr;
use super::download_task::{DownloadTaskContext, PlaylistSlot, run_download_task};

/// A dispatch acknowledgment plus the task handle when one was spawned
pub(crate) struct Dispatched {
    pub(crate) ack: DispatchAck,
    pub(crate) handle: Option<JoinHandle<TaskOutcome>>,
}

impl Dispatched {
    fn rejected(ack: DispatchAck) -> Self {
        Self { ack, handle: None }
    }

    /// Wait for the task, or report a skip if none was spawned
    pub(crate) async fn outcome(self) -> TaskOutcome {
        let video_id = self.ack.video_id();
        match self.handle {
            Some(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(video_id = video_id.get(), error = %e, "download task panicked");
                    TaskOutcome::Failed {
                        video_id,
                        step: crate::types::TaskStep::Fetch,
                        error: format!("download task aborted: {}", e),
                    }
                }
            },
            None => TaskOutcome::Skipped { video_id },
        }
    }
}

impl Tubarr {
    /// Claim `video` and spawn its download task
    ///
    /// Rows that are `queued`/`downloading` without a registry entry were left
    /// behind by an earlier session and are adopted.
    pub(crate) async fn dispatch(
        &self,
        video: &Video,
        slot: Option<PlaylistSlot>,
    ) -> Result<Dispatched> {
        self.ensure_accepting()?;

        let cancel_token = CancellationToken::new();
        {
            let mut in_flight = self.dispatch.in_flight.lock().await;
            if in_flight.contains_key(&video.remote_id) {
                tracing::debug!(remote_id = %video.remote_id, "download already in flight");
                return Ok(Dispatched::rejected(DispatchAck::AlreadyInFlight(video.id)));
            }

            let claimed = self
                .db
                .transition_status(
                    video.id,
                    &DownloadStatus::sources_of(DownloadStatus::Queued),
                    DownloadStatus::Queued,
                )
                .await?;

            if !claimed {
                let current = self.db.require_video(video.id).await?;
                match current.status {
                    DownloadStatus::Completed => {
                        return Ok(Dispatched::rejected(DispatchAck::AlreadyCompleted(video.id)));
                    }
                    DownloadStatus::Queued => {
                        tracing::debug!(remote_id = %video.remote_id, "adopting orphaned queued row");
                    }
                    DownloadStatus::Downloading => {
                        let requeued = self
                            .db
                            .transition_status(
                                video.id,
                                &[DownloadStatus::Downloading],
                                DownloadStatus::Queued,
                            )
                            .await?;
                        if !requeued {
                            return Ok(Dispatched::rejected(DispatchAck::AlreadyInFlight(
                                video.id,
                            )));
                        }
                        tracing::debug!(remote_id = %video.remote_id, "re-queued interrupted download");
                    }
                    // changed between the claim and the re-read; let the caller retry
                    _ => {
                        return Ok(Dispatched::rejected(DispatchAck::AlreadyInFlight(video.id)));
                    }
                }
            }

            in_flight.insert(video.remote_id.clone(), cancel_token.clone());
        }

        self.emit_event(Event::DownloadQueued {
            video_id: video.id,
            remote_id: video.remote_id.clone(),
            channel_id: video.channel_id,
        });
        tracing::debug!(
            video_id = video.id.get(),
            remote_id = %video.remote_id,
            "download dispatched"
        );

        let ctx = DownloadTaskContext {
            video_id: video.id,
            remote_id: video.remote_id.clone(),
            slot,
            cancel_token,
            engine: self.clone(),
        };
        let handle = tokio::spawn(run_download_task(ctx));

        Ok(Dispatched {
            ack: DispatchAck::Queued(video.id),
            handle: Some(handle),
        })
    }

    /// Whether a task currently owns `remote_id`
    pub async fn is_in_flight(&self, remote_id: &str) -> bool {
        self.dispatch.in_flight.lock().await.contains_key(remote_id)
    }
}
