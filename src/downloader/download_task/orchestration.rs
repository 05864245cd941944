//! Download task orchestration -- top-level lifecycle for a single download.

use crate::db::{Channel, SlotClaim, Video};
use crate::error::FetchError;
use crate::fetch::{FetchRequest, FetchedVideo, MediaFetcher};
use crate::naming::{self, EpisodeName};
use crate::retry::fetch_with_retry;
use crate::types::{DownloadStatus, Event, TaskOutcome, TaskStep};
use futures::future::join_all;
use std::path::{Path, PathBuf};

use super::context::{DownloadTaskContext, Placement, PlaylistSlot, StepFailure, StepResult};
use super::finalization::finalize_download;

/// Core download task -- drives one video to a terminal status.
///
/// Phases:
/// 1. Wait for a download slot
/// 2. Claim the row (`queued` -> `downloading`)
/// 3. Place the video (playlist season and position, or the next special)
/// 4. Render the destination path
/// 5. Fetch, retrying transient failures
/// 6. Persist the result and write sidecars and artwork
///
/// The task leaves the in-flight registry only after the row's final status
/// is written.
pub(crate) async fn run_download_task(ctx: DownloadTaskContext) -> TaskOutcome {
    let outcome = execute(&ctx).await;
    ctx.release().await;
    outcome
}

async fn execute(ctx: &DownloadTaskContext) -> TaskOutcome {
    let engine = &ctx.engine;

    // Phase 1: download slot
    let permit = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => return ctx.cancelled().await,
        permit = engine.dispatch.concurrent_limit.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(e) => return ctx.fail(StepFailure::new(TaskStep::Claim, e)).await,
        },
    };

    // Phase 2: claim
    match engine
        .db
        .transition_status(
            ctx.video_id,
            &[DownloadStatus::Queued],
            DownloadStatus::Downloading,
        )
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(remote_id = %ctx.remote_id, "video no longer queued, skipping");
            return TaskOutcome::Skipped {
                video_id: ctx.video_id,
            };
        }
        Err(e) => return ctx.fail(StepFailure::new(TaskStep::Claim, e)).await,
    }

    let (video, channel) = match load_rows(ctx).await {
        Ok(rows) => rows,
        Err(failure) => return ctx.fail(failure).await,
    };

    // Phase 3: placement
    let placement = match resolve_placement(ctx, &video).await {
        Ok(placement) => placement,
        Err(failure) => return ctx.fail(failure).await,
    };
    engine.emit_event(Event::DownloadStarted {
        video_id: video.id,
        remote_id: video.remote_id.clone(),
        season: placement.season,
        episode: placement.episode,
    });
    tracing::info!(
        video_id = video.id.get(),
        remote_id = %video.remote_id,
        season = placement.season,
        episode = placement.episode,
        "download started"
    );

    // Phase 4: render
    let destination = match render_destination(ctx, &video, &channel, &placement) {
        Ok(destination) => destination,
        Err(failure) => return ctx.fail(failure).await,
    };

    // Phase 5: fetch
    let fetched = match fetch(ctx, &video, &channel, &placement, &destination).await {
        Ok(fetched) => fetched,
        Err(FetchError::Cancelled) => return ctx.cancelled().await,
        Err(e) => return ctx.fail(StepFailure::new(TaskStep::Fetch, e)).await,
    };
    drop(permit);

    // Phase 6: persist, sidecars, artwork
    finalize_download(ctx, &video, &channel, &placement, &destination, fetched).await
}

async fn load_rows(ctx: &DownloadTaskContext) -> StepResult<(Video, Channel)> {
    let db = &ctx.engine.db;
    let video = db
        .require_video(ctx.video_id)
        .await
        .map_err(|e| StepFailure::new(TaskStep::Claim, e))?;
    let channel = db
        .require_channel(video.channel_id)
        .await
        .map_err(|e| StepFailure::new(TaskStep::Claim, e))?;
    Ok((video, channel))
}

/// Decide `(season, episode)` for the video
///
/// An existing placement is kept, so a retried download keeps its number.
/// A playlist member claims its listing position, falling back to the next
/// free number of that season if the position is held by another video.
/// Everything else becomes the next special (season 0).
async fn resolve_placement(ctx: &DownloadTaskContext, video: &Video) -> StepResult<Placement> {
    let db = &ctx.engine.db;
    let placement_err = |e| StepFailure::new(TaskStep::Placement, e);

    if let Some((season, episode)) = video.placement() {
        let playlist = match video.playlist_id {
            Some(id) => db.get_playlist(id).await.map_err(placement_err)?,
            None => None,
        };
        return Ok(Placement {
            season,
            episode,
            playlist,
        });
    }

    let slot = match &ctx.slot {
        Some(slot) => Some(slot.clone()),
        None => find_playlist_membership(ctx, video).await,
    };

    let Some(PlaylistSlot { playlist, position }) = slot else {
        let (season, episode) = db
            .assign_next_episode(video, 0, None)
            .await
            .map_err(placement_err)?;
        return Ok(Placement {
            season,
            episode,
            playlist: None,
        });
    };

    let season = playlist.season_number;
    let claim = db
        .claim_episode_slot(video.id, season, position, Some(playlist.id))
        .await
        .map_err(placement_err)?;

    let (season, episode) = match claim {
        SlotClaim::Claimed => (season, position),
        SlotClaim::Occupied => {
            tracing::debug!(
                remote_id = %video.remote_id,
                season,
                position,
                "playlist position taken, numbering sequentially"
            );
            db.assign_next_episode(video, season, Some(playlist.id))
                .await
                .map_err(placement_err)?
        }
        SlotClaim::AlreadyPlaced => {
            let current = db.require_video(video.id).await.map_err(placement_err)?;
            current.placement().ok_or_else(|| {
                StepFailure::new(TaskStep::Placement, "video placement disappeared")
            })?
        }
    };

    Ok(Placement {
        season,
        episode,
        playlist: Some(playlist),
    })
}

/// Look the video up in the channel's monitored playlists
///
/// Listing failures are logged and that playlist is skipped.
async fn find_playlist_membership(
    ctx: &DownloadTaskContext,
    video: &Video,
) -> Option<PlaylistSlot> {
    let playlists = match ctx.engine.db.list_monitored_playlists(video.channel_id).await {
        Ok(playlists) => playlists,
        Err(e) => {
            tracing::warn!(remote_id = %video.remote_id, error = %e, "could not read playlists");
            return None;
        }
    };
    if playlists.is_empty() {
        return None;
    }

    let listing = &ctx.engine.backends.listing;
    let listings = join_all(
        playlists
            .iter()
            .map(|playlist| listing.list_playlist_videos(&playlist.remote_id)),
    )
    .await;

    // playlists come ordered by season, so the lowest season wins
    for (playlist, entries) in playlists.into_iter().zip(listings) {
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    playlist = %playlist.remote_id,
                    error = %e,
                    "could not list playlist, skipping"
                );
                continue;
            }
        };
        if let Some(index) = entries.iter().position(|e| e.remote_id == video.remote_id) {
            return Some(PlaylistSlot {
                playlist,
                position: index as u32 + 1,
            });
        }
    }
    None
}

fn render_destination(
    ctx: &DownloadTaskContext,
    video: &Video,
    channel: &Channel,
    placement: &Placement,
) -> StepResult<PathBuf> {
    let name = EpisodeName {
        channel: &channel.name,
        season: placement.season,
        episode: placement.episode,
        title: None,
        remote_id: &video.remote_id,
        season_name: placement.season_name(),
    };
    let relative = naming::render(&name, &ctx.engine.template)
        .map_err(|e| StepFailure::new(TaskStep::Render, e))?;
    Ok(placement.root(channel).join(relative))
}

async fn fetch(
    ctx: &DownloadTaskContext,
    video: &Video,
    channel: &Channel,
    placement: &Placement,
    destination: &Path,
) -> Result<FetchedVideo, FetchError> {
    let request = FetchRequest {
        remote_id: &video.remote_id,
        destination,
        quality: placement.quality(channel),
    };
    let request = &request;
    let fetcher: &dyn MediaFetcher = ctx.engine.backends.fetcher.as_ref();
    let cancel = &ctx.cancel_token;

    fetch_with_retry(&ctx.engine.config.download.retry, cancel, move || {
        fetcher.fetch(request, cancel)
    })
    .await
}
