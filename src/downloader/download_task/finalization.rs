//! Download finalization -- record the fetched file, then sidecars and artwork.

use crate::artwork::{POSTER, season_poster_name};
use crate::db::{Channel, Video, VideoMetadataUpdate};
use crate::fetch::{FetchedVideo, VideoMetadata};
use crate::naming::SPECIALS_DIR;
use crate::naming::sidecar::{
    self, EpisodeInfo, SEASON_NFO, SeasonInfo, ShowInfo, TVSHOW_NFO,
};
use crate::types::{DownloadStatus, Event, TaskOutcome, TaskStep};
use chrono::{DateTime, NaiveDate};
use std::path::Path;

use super::context::{DownloadTaskContext, Placement, StepFailure, StepWarning};

/// Unix timestamp of midnight UTC on `date`
pub(crate) fn date_timestamp(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp())
}

/// Record the fetched file and run the best-effort steps.
///
/// Persisting is fatal: if the row cannot be marked `completed` the task
/// fails. Sidecar and artwork problems are logged and do not change the
/// outcome.
pub(super) async fn finalize_download(
    ctx: &DownloadTaskContext,
    video: &Video,
    channel: &Channel,
    placement: &Placement,
    destination: &Path,
    fetched: FetchedVideo,
) -> TaskOutcome {
    let db = &ctx.engine.db;
    let FetchedVideo { path, metadata } = fetched;

    let size = tokio::fs::metadata(&path)
        .await
        .ok()
        .map(|m| m.len() as i64);

    let update = VideoMetadataUpdate {
        title: metadata.title.clone().filter(|t| !t.is_empty()),
        published_at: metadata.upload_date.and_then(date_timestamp),
        duration_secs: metadata.duration_secs,
    };
    if let Err(e) = db.update_metadata(video.id, &update).await {
        return ctx.fail(StepFailure::new(TaskStep::Persist, e)).await;
    }

    let path_str = path.to_string_lossy();
    match db
        .mark_completed(video.id, &path_str, size, &[DownloadStatus::Downloading])
        .await
    {
        Ok(true) => {}
        Ok(false) => match db.get_video(video.id).await {
            Ok(None) => return discard_orphaned_file(ctx, &path).await,
            _ => {
                return ctx
                    .fail(StepFailure::new(
                        TaskStep::Persist,
                        "video row changed during download",
                    ))
                    .await;
            }
        },
        Err(e) => return ctx.fail(StepFailure::new(TaskStep::Persist, e)).await,
    }

    let library = &ctx.engine.config.library;
    let mut warnings = Vec::new();
    if library.write_sidecars {
        if let Err(w) =
            write_sidecars(video, channel, placement, destination, &path, &metadata).await
        {
            warnings.push(w);
        }
    }
    if library.fetch_artwork {
        warnings.extend(fetch_artwork(ctx, channel, placement, destination, &metadata).await);
    }
    for warning in &warnings {
        ctx.warn(warning);
    }

    tracing::info!(
        video_id = video.id.get(),
        remote_id = %video.remote_id,
        path = %path.display(),
        warnings = warnings.len(),
        "download complete"
    );
    ctx.engine.emit_event(Event::DownloadCompleted {
        video_id: video.id,
        remote_id: video.remote_id.clone(),
        path: path.clone(),
    });

    TaskOutcome::Completed {
        video_id: video.id,
        path,
    }
}

/// Remove the file (and episode sidecar) of a video deleted while its fetch ran
async fn discard_orphaned_file(ctx: &DownloadTaskContext, path: &Path) -> TaskOutcome {
    for file in [path.to_path_buf(), sidecar::episode_path(path)] {
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %file.display(), error = %e, "failed to remove orphaned file"),
        }
    }

    tracing::info!(
        video_id = ctx.video_id.get(),
        remote_id = %ctx.remote_id,
        path = %path.display(),
        "video deleted during download, fetched file removed"
    );
    ctx.engine.emit_event(Event::DownloadCancelled {
        video_id: ctx.video_id,
        remote_id: ctx.remote_id.clone(),
    });

    TaskOutcome::Cancelled {
        video_id: ctx.video_id,
    }
}

/// Write `tvshow.nfo` and `season.nfo` if absent and always rewrite the
/// episode document
async fn write_sidecars(
    video: &Video,
    channel: &Channel,
    placement: &Placement,
    destination: &Path,
    media: &Path,
    metadata: &VideoMetadata,
) -> Result<(), StepWarning> {
    let warn = |e| StepWarning::new(TaskStep::Sidecar, e);
    let (show_dir, season_dir) = layout_dirs(destination)
        .ok_or_else(|| StepWarning::new(TaskStep::Sidecar, "destination has no season directory"))?;

    let show = sidecar::show_document(&ShowInfo {
        title: channel.name.clone(),
        plot: channel.description.clone(),
        premiered: DateTime::from_timestamp(channel.added_at, 0).map(|dt| dt.date_naive()),
    })
    .map_err(warn)?;
    sidecar::write_if_absent(&show_dir.join(TVSHOW_NFO), show)
        .await
        .map_err(warn)?;

    let season = sidecar::season_document(&SeasonInfo {
        title: placement
            .season_name()
            .unwrap_or(SPECIALS_DIR)
            .to_string(),
        season_number: placement.season,
        plot: None,
    })
    .map_err(warn)?;
    sidecar::write_if_absent(&season_dir.join(SEASON_NFO), season)
        .await
        .map_err(warn)?;

    let episode = sidecar::episode_document(&EpisodeInfo {
        title: metadata
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| video.title.clone()),
        show_title: channel.name.clone(),
        season: placement.season,
        episode: placement.episode,
        plot: metadata.description.clone(),
        aired: metadata.upload_date,
        thumb: metadata.thumbnail.clone(),
        duration_secs: metadata.duration_secs.or(video.duration_secs),
        unique_id: video.remote_id.clone(),
    })
    .map_err(warn)?;
    sidecar::write_replace(&sidecar::episode_path(media), &episode)
        .await
        .map_err(warn)?;

    Ok(())
}

/// Channel poster, and season artwork for the first episode of a season
async fn fetch_artwork(
    ctx: &DownloadTaskContext,
    channel: &Channel,
    placement: &Placement,
    destination: &Path,
    metadata: &VideoMetadata,
) -> Vec<StepWarning> {
    let artwork = &ctx.engine.backends.artwork;
    let mut warnings = Vec::new();
    let Some((show_dir, _)) = layout_dirs(destination) else {
        return warnings;
    };

    if let Some(url) = &channel.thumbnail {
        if let Err(e) = artwork.download_if_absent(url, &show_dir.join(POSTER)).await {
            warnings.push(StepWarning::new(TaskStep::Artwork, e));
        }
    }

    if placement.episode == 1 {
        if let Some(url) = &metadata.thumbnail {
            let dest = show_dir.join(season_poster_name(placement.season));
            if let Err(e) = artwork.download_if_absent(url, &dest).await {
                warnings.push(StepWarning::new(TaskStep::Artwork, e));
            }
        }
    }

    warnings
}

/// `(show dir, season dir)` of a rendered destination
fn layout_dirs(destination: &Path) -> Option<(&Path, &Path)> {
    let season_dir = destination.parent()?;
    let show_dir = season_dir.parent()?;
    Some((show_dir, season_dir))
}
