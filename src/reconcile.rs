//! Filesystem reconciliation
//!
//! The disk join key is the trailing `[<remote id>]` token of a media file's
//! stem. Scanning and planning are separate: [`scan_roots`] reads the disk,
//! [`plan_reconciliation`] diffs a channel's rows against the scanned files and
//! returns the repair actions. Applying them is the engine's job
//! (`Tubarr::rescan_channel`), which uses compare-and-set status updates so
//! rows claimed by a download task in the meantime are left alone.

use crate::db::Video;
use crate::error::{Error, Result};
use crate::types::{DownloadStatus, VideoId};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Extensions treated as media files
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "webm", "m4v", "mov"];

#[allow(clippy::expect_used)]
static EPISODE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])s(\d{1,3})e(\d{1,4})(?:[^0-9]|$)")
        .expect("episode marker regex should compile")
});

/// Remote id from a file stem's trailing `[...]` token
///
/// The token must be the last thing in the stem, non-empty, and free of
/// whitespace and brackets.
pub fn extract_remote_id(stem: &str) -> Option<&str> {
    let inner = stem.trim_end().strip_suffix(']')?;
    let open = inner.rfind('[')?;
    let id = &inner[open + 1..];
    if id.is_empty() || id.chars().any(|c| c.is_whitespace() || c == '[' || c == ']') {
        return None;
    }
    Some(id)
}

/// `(season, episode)` from an `SxxEyy` marker in a stem
pub fn parse_episode_marker(stem: &str) -> Option<(u32, u32)> {
    let caps = EPISODE_MARKER.captures(stem)?;
    let season = caps[1].parse().ok()?;
    let episode = caps[2].parse().ok()?;
    Some((season, episode))
}

/// Human title for an imported file
///
/// Drops the `[id]` token and everything up to and including an `SxxEyy`
/// marker, then trims separators. Falls back to the remote id.
pub fn derive_title(stem: &str, remote_id: &str) -> String {
    let token = format!("[{}]", remote_id);
    let without_id = match stem.trim_end().strip_suffix(token.as_str()) {
        Some(rest) => rest,
        None => stem,
    };
    let after_marker = match EPISODE_MARKER.find(without_id) {
        Some(m) => &without_id[m.end()..],
        None => without_id,
    };
    let separators: &[char] = &[' ', '-', '.', '_'];
    let title = after_marker.trim_matches(separators);
    if title.is_empty() {
        remote_id.to_string()
    } else {
        title.to_string()
    }
}

/// A media file found under a channel root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedFile {
    /// Full path
    pub path: PathBuf,
    /// Remote id from the stem
    pub remote_id: String,
    /// File stem (name without extension)
    pub stem: String,
    /// Modification time, unix seconds
    pub modified: Option<i64>,
    /// Size in bytes
    pub size: u64,
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Recursively list media files carrying a remote id token under `roots`
///
/// A root that does not exist contributes nothing. A root that exists but
/// cannot be read is a [`Error::Filesystem`]; unreadable entries below it are
/// logged and skipped. When two files carry the same id the first path in
/// sorted order wins.
pub fn scan_roots(roots: &[PathBuf]) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for root in roots {
        match std::fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::filesystem(
                    root,
                    std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
                ));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(root = %root.display(), "channel directory does not exist");
                continue;
            }
            Err(e) => return Err(Error::filesystem(root, e)),
        }

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    let io = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    return Err(Error::filesystem(root, io));
                }
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_video_file(entry.path()) {
                continue;
            }
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(remote_id) = extract_remote_id(stem) else {
                continue;
            };
            if !seen.insert(remote_id.to_string()) {
                tracing::warn!(
                    remote_id = %remote_id,
                    path = %entry.path().display(),
                    "duplicate file for video, ignoring"
                );
                continue;
            }

            let meta = entry.metadata().ok();
            files.push(ScannedFile {
                path: entry.path().to_path_buf(),
                remote_id: remote_id.to_string(),
                stem: stem.to_string(),
                modified: meta
                    .as_ref()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64),
                size: meta.map(|m| m.len()).unwrap_or(0),
            });
        }
    }

    Ok(files)
}

/// One change to bring the catalog in line with the disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepairAction {
    /// Downloaded row whose file is gone: back to `pending`, path cleared
    MarkMissing {
        /// Row
        video_id: VideoId,
        /// Remote id
        remote_id: String,
        /// Path the row held when planned; the repair is skipped if it changed
        expected_path: Option<String>,
    },
    /// Row not marked downloaded whose file is present
    MarkDownloaded {
        /// Row
        video_id: VideoId,
        /// Remote id
        remote_id: String,
        /// Status the row had when planned
        from: DownloadStatus,
        /// File found
        path: PathBuf,
        /// File size
        size: u64,
    },
    /// Downloaded row whose file lives at a different path
    Relocated {
        /// Row
        video_id: VideoId,
        /// Remote id
        remote_id: String,
        /// New path
        path: PathBuf,
    },
    /// File with no catalog row
    Import {
        /// Remote id
        remote_id: String,
        /// Title derived from the file name
        title: String,
        /// File found
        path: PathBuf,
        /// File size
        size: u64,
        /// File modification time
        published_at: Option<i64>,
        /// `(season, episode)` from an `SxxEyy` marker
        marker: Option<(u32, u32)>,
    },
}

/// Diff one channel's rows against the files found under its roots
///
/// Rows that are `queued` or `downloading` belong to a running task and are
/// never touched. Actions come out in row order, then file order.
pub fn plan_reconciliation(videos: &[Video], files: &[ScannedFile]) -> Vec<RepairAction> {
    let by_id: HashMap<&str, &ScannedFile> =
        files.iter().map(|f| (f.remote_id.as_str(), f)).collect();
    let known: HashSet<&str> = videos.iter().map(|v| v.remote_id.as_str()).collect();
    let mut actions = Vec::new();

    for video in videos {
        if video.status.is_in_flight() {
            continue;
        }
        let file = by_id.get(video.remote_id.as_str());
        match (video.status, file) {
            (DownloadStatus::Completed, None) => actions.push(RepairAction::MarkMissing {
                video_id: video.id,
                remote_id: video.remote_id.clone(),
                expected_path: video.file_path.clone(),
            }),
            (DownloadStatus::Completed, Some(file)) => {
                if video.file_path.as_deref().map(Path::new) != Some(file.path.as_path()) {
                    actions.push(RepairAction::Relocated {
                        video_id: video.id,
                        remote_id: video.remote_id.clone(),
                        path: file.path.clone(),
                    });
                }
            }
            (status, Some(file)) => actions.push(RepairAction::MarkDownloaded {
                video_id: video.id,
                remote_id: video.remote_id.clone(),
                from: status,
                path: file.path.clone(),
                size: file.size,
            }),
            (_, None) => {}
        }
    }

    for file in files {
        if known.contains(file.remote_id.as_str()) {
            continue;
        }
        actions.push(RepairAction::Import {
            remote_id: file.remote_id.clone(),
            title: derive_title(&file.stem, &file.remote_id),
            path: file.path.clone(),
            size: file.size,
            published_at: file.modified,
            marker: parse_episode_marker(&file.stem),
        });
    }

    actions
}
