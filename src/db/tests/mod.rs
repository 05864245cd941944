use crate::db::*;
use crate::types::{ChannelId, DownloadStatus, Quality};
use std::path::PathBuf;
use tempfile::NamedTempFile;


async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

fn new_channel(remote_id: &str) -> NewChannel {
    NewChannel {
        remote_id: remote_id.to_string(),
        name: format!("Channel {}", remote_id),
        url: format!("https://www.youtube.com/channel/{}", remote_id),
        thumbnail: None,
        description: None,
        monitored: true,
        download_root: PathBuf::from("/library"),
        quality: Quality::P1080,
    }
}

async fn seed_channel(db: &Database, remote_id: &str) -> ChannelId {
    db.insert_channel(&new_channel(remote_id)).await.unwrap()
}

fn new_video(channel_id: ChannelId, remote_id: &str) -> NewVideo {
    NewVideo {
        remote_id: remote_id.to_string(),
        channel_id,
        title: format!("Video {}", remote_id),
        published_at: None,
        duration_secs: None,
        status: DownloadStatus::Pending,
        file_path: None,
        file_size: None,
    }
}

fn new_playlist(channel_id: ChannelId, remote_id: &str) -> NewPlaylist {
    NewPlaylist {
        remote_id: remote_id.to_string(),
        channel_id,
        title: format!("Playlist {}", remote_id),
        monitored: true,
        quality: None,
        download_root: None,
    }
}
