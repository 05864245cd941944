//! Library rescan -- reconcile catalog rows with the files on disk.

use crate::db::{Channel, NewVideo, SlotClaim};
use crate::error::{Error, Result};
use crate::naming;
use crate::reconcile::{RepairAction, plan_reconciliation, scan_roots};
use crate::types::{ChannelId, DownloadStatus, Event, ReconcileReport};
use std::path::PathBuf;

use super::Tubarr;

impl Tubarr {
    /// Reconcile one channel against its directories
    ///
    /// Downloaded rows whose file is gone go back to `pending`, rows whose
    /// file turned up are marked `completed`, moved files get their path
    /// updated, and unknown files carrying a `[remote id]` token are imported.
    /// Rows owned by a running task are left alone. A second run with no disk
    /// changes in between reports no mutations.
    pub async fn rescan_channel(&self, channel_id: ChannelId) -> Result<ReconcileReport> {
        let channel = self.db.require_channel(channel_id).await?;
        let roots = self.channel_roots(&channel).await?;

        // Rows first: a download finishing during the walk is still in flight
        // in this snapshot, so its new file is neither imported nor reverted.
        let videos = self.db.list_videos_for_channel(channel.id).await?;
        let files = tokio::task::spawn_blocking(move || scan_roots(&roots))
            .await
            .map_err(|e| Error::Other(format!("rescan task failed: {}", e)))??;
        let actions = plan_reconciliation(&videos, &files);

        let mut report = ReconcileReport::default();
        for action in actions {
            self.apply_repair(&channel, action, &mut report).await?;
        }

        tracing::info!(
            channel_id = channel_id.get(),
            files = files.len(),
            updated = report.updated,
            imported = report.imported,
            "rescan complete"
        );
        self.emit_event(Event::RescanComplete {
            channel_id,
            report,
        });
        Ok(report)
    }

    /// Rescan every channel
    ///
    /// A channel that fails (for example an unreadable directory) gets an
    /// error entry; the rest still run.
    pub async fn rescan_all(&self) -> Result<Vec<(ChannelId, Result<ReconcileReport>)>> {
        let channels = self.db.list_channels().await?;
        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            let result = self.rescan_channel(channel.id).await;
            if let Err(e) = &result {
                tracing::warn!(channel_id = channel.id.get(), error = %e, "rescan failed");
            }
            results.push((channel.id, result));
        }
        Ok(results)
    }

    /// Channel directory plus the channel directories under playlist root overrides
    async fn channel_roots(&self, channel: &Channel) -> Result<Vec<PathBuf>> {
        let show = naming::show_dir(&channel.name)?;
        let mut roots = vec![channel.directory()?];
        for playlist in self.db.list_playlists(channel.id).await? {
            if let Some(root) = &playlist.download_root {
                let dir = PathBuf::from(root).join(&show);
                if !roots.contains(&dir) {
                    roots.push(dir);
                }
            }
        }
        Ok(roots)
    }

    async fn apply_repair(
        &self,
        channel: &Channel,
        action: RepairAction,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        match action {
            RepairAction::MarkMissing {
                video_id,
                remote_id,
                expected_path,
            } => {
                if self
                    .db
                    .mark_missing(video_id, expected_path.as_deref())
                    .await?
                {
                    tracing::info!(%remote_id, "file missing, video back to pending");
                    report.updated += 1;
                }
            }
            RepairAction::MarkDownloaded {
                video_id,
                remote_id,
                from,
                path,
                size,
            } => {
                let path_str = path.to_string_lossy();
                if self
                    .db
                    .mark_completed(video_id, &path_str, Some(size as i64), &[from])
                    .await?
                {
                    tracing::info!(%remote_id, path = %path.display(), "found file on disk");
                    report.updated += 1;
                }
            }
            RepairAction::Relocated {
                video_id,
                remote_id,
                path,
            } => {
                let path_str = path.to_string_lossy();
                if self.db.update_file_path(video_id, &path_str, None).await? {
                    tracing::info!(%remote_id, path = %path.display(), "file moved");
                    report.updated += 1;
                }
            }
            RepairAction::Import {
                remote_id,
                title,
                path,
                size,
                published_at,
                marker,
            } => {
                let inserted = self
                    .db
                    .insert_video_if_absent(&NewVideo {
                        remote_id: remote_id.clone(),
                        channel_id: channel.id,
                        title,
                        published_at,
                        duration_secs: None,
                        status: DownloadStatus::Completed,
                        file_path: Some(path.to_string_lossy().into_owned()),
                        file_size: Some(size as i64),
                    })
                    .await?;

                let Some(video_id) = inserted else {
                    tracing::warn!(
                        %remote_id,
                        channel_id = channel.id.get(),
                        path = %path.display(),
                        "file belongs to a video of another channel, skipping"
                    );
                    return Ok(());
                };
                report.imported += 1;

                if let Some((season, episode)) = marker {
                    match self
                        .db
                        .claim_episode_slot(video_id, season, episode, None)
                        .await?
                    {
                        SlotClaim::Claimed => {}
                        SlotClaim::Occupied | SlotClaim::AlreadyPlaced => tracing::debug!(
                            %remote_id,
                            season,
                            episode,
                            "episode marker slot taken, leaving unnumbered"
                        ),
                    }
                }
                tracing::info!(%remote_id, path = %path.display(), "imported file");
            }
        }
        Ok(())
    }
}
