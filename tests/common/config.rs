//! Test configuration helpers for creating engines over temporary directories

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tubarr::{Config, Tubarr};

use super::fixtures::FakeYtDlp;

/// Config rooted in `dir` that runs the given `yt-dlp` binary
pub fn test_config(dir: &Path, ytdlp: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("tubarr.db");
    config.library.default_download_root = dir.join("library");
    config.library.fetch_artwork = false;
    config.tools.ytdlp_path = Some(ytdlp.to_path_buf());
    config.download.max_concurrent_downloads = 2;
    config.download.retry.max_attempts = 2;
    config.download.retry.initial_delay = Duration::from_millis(5);
    config.download.retry.max_delay = Duration::from_millis(20);
    config.download.retry.jitter = false;
    config
}

/// Engine over a fresh temp dir, driving a fake `yt-dlp` that lists `videos`
///
/// The returned `TempDir` must be kept alive for the duration of the test.
pub async fn create_engine(videos: &[&str]) -> (Tubarr, FakeYtDlp, Config, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let fake = FakeYtDlp::install(&temp_dir.path().join("bin"), videos);
    let config = test_config(temp_dir.path(), &fake.binary());
    let engine = Tubarr::new(config.clone()).await.unwrap();
    (engine, fake, config, temp_dir)
}

/// Video id used by live tests (`TUBARR_LIVE_VIDEO_ID`, loaded from `.env`)
pub fn live_video_id() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("TUBARR_LIVE_VIDEO_ID")
        .ok()
        .filter(|id| !id.is_empty())
}

/// Whether a real `yt-dlp` is installed and a live video is configured
pub fn has_live_setup() -> bool {
    which_ytdlp().is_some() && live_video_id().is_some()
}

/// The `yt-dlp` found in PATH, if any
pub fn which_ytdlp() -> Option<std::path::PathBuf> {
    tubarr::YtDlp::from_path().map(|y| y.binary_path().to_path_buf())
}

/// Skip test if yt-dlp or the live video id is not available
#[macro_export]
macro_rules! skip_if_no_live_setup {
    () => {
        if !$crate::common::has_live_setup() {
            eprintln!("Skipping test: yt-dlp not in PATH or TUBARR_LIVE_VIDEO_ID not set");
            return;
        }
    };
}
