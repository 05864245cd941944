use super::*;
use crate::fetch::VideoMetadata;
use crate::naming::sidecar::episode_path;
use futures::future::join_all;

#[tokio::test]
async fn test_request_download_places_loose_video_as_first_special() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;

    let ack = t.engine.request_download(video.id).await.unwrap();
    assert_eq!(ack, DispatchAck::Queued(video.id));

    let done = wait_for_status(&t.engine, video.id, DownloadStatus::Completed).await;
    assert_eq!(done.placement(), Some((0, 1)));
    assert_eq!(done.title, "Title v1", "title comes from fetch metadata");

    let expected = t
        .root
        .join("Chan")
        .join("Specials")
        .join("Chan - S00E01 - Title v1 [v1].mkv");
    assert_eq!(done.file_path.as_deref(), Some(expected.to_str().unwrap()));
    assert!(expected.exists());
    assert_eq!(done.file_size, Some(5));
}

#[tokio::test]
async fn test_completed_download_writes_sidecars() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;

    let outcome = t.engine.download_and_wait(video.id).await.unwrap();
    let TaskOutcome::Completed { path, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    let show = read(&t.root.join("Chan").join("tvshow.nfo"));
    assert!(show.contains("<title>Chan</title>"), "{show}");
    let season = read(&t.root.join("Chan").join("Specials").join("season.nfo"));
    assert!(season.contains("<seasonnumber>0</seasonnumber>"), "{season}");
    let episode = read(&episode_path(&path));
    assert!(episode.contains("<episode>1</episode>"), "{episode}");
    assert!(episode.contains(">v1</uniqueid>"), "{episode}");
}

#[tokio::test]
async fn test_second_request_while_in_flight_is_rejected() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher.set_behavior("v1", FetchBehavior::BlockUntilCancelled);

    assert_eq!(
        t.engine.request_download(video.id).await.unwrap(),
        DispatchAck::Queued(video.id)
    );
    assert_eq!(
        t.engine.request_download(video.id).await.unwrap(),
        DispatchAck::AlreadyInFlight(video.id)
    );

    t.engine.cancel_download(video.id).await.unwrap();
    wait_for_status(&t.engine, video.id, DownloadStatus::Pending).await;
    assert_eq!(t.fetcher.call_count("v1"), 1);
}

#[tokio::test]
async fn test_concurrent_requests_spawn_one_task() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher
        .set_behavior("v1", FetchBehavior::Delay(std::time::Duration::from_millis(50)));

    let acks = join_all((0..8).map(|_| t.engine.request_download(video.id))).await;
    let queued = acks
        .iter()
        .filter(|ack| matches!(ack, Ok(DispatchAck::Queued(_))))
        .count();
    assert_eq!(queued, 1, "acks: {acks:?}");

    wait_for_status(&t.engine, video.id, DownloadStatus::Completed).await;
    assert_eq!(t.fetcher.call_count("v1"), 1);
}

#[tokio::test]
async fn test_request_for_completed_video_does_not_refetch() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;

    t.engine.download_and_wait(video.id).await.unwrap();
    let ack = t.engine.request_download(video.id).await.unwrap();

    assert_eq!(ack, DispatchAck::AlreadyCompleted(video.id));
    assert_eq!(t.fetcher.call_count("v1"), 1);
}

#[tokio::test]
async fn test_request_unknown_video_is_not_found() {
    let (t, _temp_dir) = create_test_engine().await;
    let err = t
        .engine
        .request_download(crate::types::VideoId(404))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn test_cancel_returns_video_to_pending() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher.set_behavior("v1", FetchBehavior::BlockUntilCancelled);
    let mut rx = t.engine.subscribe();

    t.engine.request_download(video.id).await.unwrap();
    wait_for_fetch(&t.fetcher, "v1").await;
    assert!(t.engine.cancel_download(video.id).await.unwrap());

    let row = wait_for_status(&t.engine, video.id, DownloadStatus::Pending).await;
    assert!(row.file_path.is_none());
    assert!(!t.engine.cancel_download(video.id).await.unwrap(), "nothing left to cancel");
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, Event::DownloadCancelled { video_id, .. } if *video_id == video.id))
    );
}

#[tokio::test]
async fn test_failed_fetch_is_recorded_on_the_row() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher.set_behavior(
        "v1",
        FetchBehavior::Fail(FetchError::Unavailable("private video".into())),
    );

    let outcome = t.engine.download_and_wait(video.id).await.unwrap();
    assert!(
        matches!(outcome, TaskOutcome::Failed { step: TaskStep::Fetch, .. }),
        "{outcome:?}"
    );

    let row = t.engine.get_video(video.id).await.unwrap();
    assert_eq!(row.status, DownloadStatus::Failed);
    assert!(row.error_message.unwrap().contains("private video"));
    assert_eq!(t.fetcher.call_count("v1"), 1, "unavailable is not retried");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher.set_behavior(
        "v1",
        FetchBehavior::FailTimes(2, FetchError::Network("connection reset".into())),
    );

    let outcome = t.engine.download_and_wait(video.id).await.unwrap();

    assert!(matches!(outcome, TaskOutcome::Completed { .. }), "{outcome:?}");
    assert_eq!(t.fetcher.call_count("v1"), 3);
}

#[tokio::test]
async fn test_retry_keeps_episode_number() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let first = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    let second = seed_video(&t, channel.id, "v2", DownloadStatus::Pending).await;
    t.fetcher.set_behavior(
        "v1",
        FetchBehavior::Fail(FetchError::Unavailable("not yet".into())),
    );

    t.engine.download_and_wait(first.id).await.unwrap();
    let failed = t.engine.get_video(first.id).await.unwrap();
    assert_eq!(failed.placement(), Some((0, 1)));

    t.engine.download_and_wait(second.id).await.unwrap();
    let other = t.engine.get_video(second.id).await.unwrap();
    assert_eq!(other.placement(), Some((0, 2)));

    t.fetcher.set_behavior("v1", FetchBehavior::Succeed);
    let ack = t.engine.retry_download(first.id).await.unwrap();
    assert_eq!(ack, DispatchAck::Queued(first.id));

    let done = wait_for_status(&t.engine, first.id, DownloadStatus::Completed).await;
    assert_eq!(done.placement(), Some((0, 1)));
    assert!(done.error_message.is_none());
}

#[tokio::test]
async fn test_retry_requires_failed_status() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;

    let err = t.engine.retry_download(video.id).await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::Download(DownloadError::InvalidState {
                current: DownloadStatus::Pending,
                ..
            })
        ),
        "{err}"
    );
}

#[tokio::test]
async fn test_delete_video_removes_file_and_row() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    let TaskOutcome::Completed { path, .. } = t.engine.download_and_wait(video.id).await.unwrap()
    else {
        panic!("download should complete");
    };
    assert!(path.exists());

    t.engine.delete_video(video.id).await.unwrap();

    assert!(!path.exists());
    assert!(!episode_path(&path).exists());
    assert!(t.engine.get_video(video.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_video_with_missing_file_succeeds() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    let TaskOutcome::Completed { path, .. } = t.engine.download_and_wait(video.id).await.unwrap()
    else {
        panic!("download should complete");
    };
    std::fs::remove_file(&path).unwrap();

    t.engine.delete_video(video.id).await.unwrap();
    assert!(t.engine.get_video(video.id).await.unwrap_err().is_not_found());
}

/// Every media file under the test library
fn library_videos(t: &TestEngine) -> Vec<std::path::PathBuf> {
    crate::reconcile::scan_roots(&[t.root.clone()])
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect()
}

#[tokio::test]
async fn test_delete_video_during_fetch_discards_fetched_file() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher
        .set_behavior("v1", FetchBehavior::IgnoreCancel(Duration::from_millis(100)));

    t.engine.request_download(video.id).await.unwrap();
    wait_for_fetch(&t.fetcher, "v1").await;
    t.engine.delete_video(video.id).await.unwrap();
    wait_for_release(&t.engine, "v1").await;

    assert!(library_videos(&t).is_empty(), "{:?}", library_videos(&t));
    let report = t.engine.rescan_channel(channel.id).await.unwrap();
    assert_eq!(report.imported, 0, "deleted video must not come back");
    assert!(t.engine.db.get_video_by_remote_id("v1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_channel_during_fetch_discards_fetched_file() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher
        .set_behavior("v1", FetchBehavior::IgnoreCancel(Duration::from_millis(100)));

    t.engine.request_download(video.id).await.unwrap();
    wait_for_fetch(&t.fetcher, "v1").await;
    t.engine.delete_channel(channel.id).await.unwrap();
    wait_for_release(&t.engine, "v1").await;

    assert!(library_videos(&t).is_empty(), "{:?}", library_videos(&t));
}

#[tokio::test]
async fn test_request_remote_download_creates_row() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    t.fetcher.set_metadata(
        "new1",
        VideoMetadata {
            title: Some("Fresh Upload".into()),
            duration_secs: Some(61),
            ..VideoMetadata::default()
        },
    );

    let ack = t
        .engine
        .request_remote_download(channel.id, "new1")
        .await
        .unwrap();

    let row = wait_for_status(&t.engine, ack.video_id(), DownloadStatus::Completed).await;
    assert_eq!(row.remote_id, "new1");
    assert_eq!(row.channel_id, channel.id);
    assert_eq!(row.title, "Fresh Upload");
    assert_eq!(row.duration_secs, Some(61));
}

#[tokio::test]
async fn test_engine_rejects_template_without_filename() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.library.naming.preset = crate::naming::NamingPreset::Custom;
    config.library.naming.custom_template = Some("???".into());

    let result = Tubarr::with_backends(
        config,
        Arc::new(MockFetcher::default()),
        Arc::new(MockListing::default()),
    )
    .await;

    assert!(matches!(result, Err(Error::InvalidTemplate(_))));
}
