//! Custom test assertions for integration tests

use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tubarr::{ChannelId, DownloadStatus, Event, SyncReport, Tubarr, Video, VideoId};

/// Wait for the sync event of one channel
///
/// Panics if no such event arrives within `timeout`.
pub async fn wait_for_channel_sync(
    events: &mut Receiver<Event>,
    channel_id: ChannelId,
    timeout: Duration,
) -> SyncReport {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::ChannelSynced {
                    channel_id: id,
                    report,
                }) if id == channel_id => return report,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await;

    match result {
        Ok(report) => report,
        Err(_) => panic!("channel {channel_id:?} did not sync within {timeout:?}"),
    }
}

/// Poll a video row until it reaches `status`
pub async fn wait_for_status(
    engine: &Tubarr,
    video_id: VideoId,
    status: DownloadStatus,
    timeout: Duration,
) -> Video {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let video = engine.get_video(video_id).await.unwrap();
        if video.status == status {
            return video;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "video {} stuck in {:?}, expected {:?}",
                video.remote_id, video.status, status
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Assert that a completed video's file exists with the expected name
pub fn assert_file_named(video: &Video, expected_name: &str) {
    let path = video
        .file_path
        .as_deref()
        .map(std::path::Path::new)
        .unwrap_or_else(|| panic!("video {} has no file path", video.remote_id));
    assert!(path.exists(), "{} does not exist", path.display());
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some(expected_name),
        "unexpected file name for {}",
        video.remote_id
    );
}
