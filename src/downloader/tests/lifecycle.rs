use super::*;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_shutdown_with_nothing_running_is_prompt() {
    let (t, _temp_dir) = create_test_engine().await;
    let mut rx = t.engine.subscribe();

    let started = Instant::now();
    t.engine.shutdown().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(drain(&mut rx).iter().any(|e| matches!(e, Event::Shutdown)));
}

#[tokio::test]
async fn test_shutdown_rejects_new_requests() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;

    t.engine.shutdown().await.unwrap();

    let err = t.engine.request_download(video.id).await.unwrap_err();
    assert!(matches!(err, Error::ShuttingDown), "{err}");
    let err = t.engine.retry_download(video.id).await.unwrap_err();
    assert!(matches!(err, Error::ShuttingDown), "{err}");
    assert!(t.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_run_until_shuts_down_when_triggered() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    let mut rx = t.engine.subscribe();
    let (trigger, triggered) = tokio::sync::oneshot::channel::<()>();

    let running = tokio::spawn(crate::run_until(t.engine.clone(), async {
        triggered.await.ok();
    }));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!running.is_finished(), "engine runs until triggered");
    t.engine.request_download(video.id).await.unwrap();
    wait_for_status(&t.engine, video.id, DownloadStatus::Completed).await;

    trigger.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run_until returns after the trigger")
        .unwrap()
        .unwrap();

    assert!(drain(&mut rx).iter().any(|e| matches!(e, Event::Shutdown)));
    let err = t.engine.request_download(video.id).await.unwrap_err();
    assert!(matches!(err, Error::ShuttingDown), "{err}");
}

#[tokio::test]
async fn test_shutdown_leaves_interrupted_download_queued() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher.set_behavior("v1", FetchBehavior::BlockUntilCancelled);

    t.engine.request_download(video.id).await.unwrap();
    wait_for_fetch(&t.fetcher, "v1").await;
    t.engine.shutdown().await.unwrap();

    assert!(!t.engine.is_in_flight("v1").await);
    let row = t.engine.get_video(video.id).await.unwrap();
    assert_eq!(row.status, DownloadStatus::Queued);
    assert_eq!(row.placement(), Some((0, 1)));
}

#[tokio::test]
async fn test_restart_resumes_interrupted_download() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher.set_behavior("v1", FetchBehavior::BlockUntilCancelled);
    t.engine.request_download(video.id).await.unwrap();
    wait_for_fetch(&t.fetcher, "v1").await;
    t.engine.shutdown().await.unwrap();

    t.fetcher.set_behavior("v1", FetchBehavior::Succeed);
    let restarted = t.restart().await;

    let done = wait_for_status(&restarted, video.id, DownloadStatus::Completed).await;
    assert_eq!(done.placement(), Some((0, 1)), "resumed download keeps its number");
    assert_eq!(t.fetcher.call_count("v1"), 2);
}

#[tokio::test]
async fn test_restart_adopts_rows_left_downloading() {
    let (t, _temp_dir) = create_test_engine().await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let stale = seed_video(&t, channel.id, "v1", DownloadStatus::Downloading).await;
    let waiting = seed_video(&t, channel.id, "v2", DownloadStatus::Queued).await;
    let idle = seed_video(&t, channel.id, "v3", DownloadStatus::Pending).await;

    let restarted = t.restart().await;

    wait_for_status(&restarted, stale.id, DownloadStatus::Completed).await;
    wait_for_status(&restarted, waiting.id, DownloadStatus::Completed).await;
    let idle = restarted.get_video(idle.id).await.unwrap();
    assert_eq!(idle.status, DownloadStatus::Pending);
}

#[tokio::test]
async fn test_shutdown_times_out_on_stuck_task() {
    let (t, _temp_dir) = create_test_engine_with(|config| {
        config.download.shutdown_timeout = Duration::from_millis(200);
    })
    .await;
    let channel = seed_channel(&t, "UC1", "Chan").await;
    let video = seed_video(&t, channel.id, "v1", DownloadStatus::Pending).await;
    t.fetcher
        .set_behavior("v1", FetchBehavior::IgnoreCancel(Duration::from_secs(3)));
    t.engine.request_download(video.id).await.unwrap();
    wait_for_fetch(&t.fetcher, "v1").await;

    let started = Instant::now();
    t.engine.shutdown().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(t.engine.is_in_flight("v1").await, "stuck task is abandoned, not awaited");
}
