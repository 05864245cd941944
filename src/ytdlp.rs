//! `yt-dlp` backed fetch and listing
//!
//! [`YtDlp`] implements both [`MediaFetcher`] and [`RemoteListing`] by running
//! the external binary and parsing its JSON output.

use crate::config::ToolsConfig;
use crate::error::{Error, FetchError, Result};
use crate::fetch::{
    ChannelInfo, FetchRequest, FetchedVideo, MediaFetcher, RemoteListing, RemotePlaylist,
    RemoteVideo, VideoMetadata,
};
use crate::naming::{DeferredToken, map_deferred_tokens};
use crate::types::Quality;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Container the fetched streams are merged into
pub const MERGE_FORMAT: &str = "mkv";

/// Fields printed after the file is moved into place
const PRINT_AFTER_MOVE: &str =
    "after_move:%(.{filepath,title,upload_date,duration,description,thumbnail})j";

/// Stderr is truncated to this many trailing bytes in errors
const STDERR_TAIL: usize = 2000;

/// Remote video URL
pub fn video_url(remote_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", remote_id)
}

/// Remote channel URL
pub fn channel_url(remote_channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{}", remote_channel_id)
}

/// Remote playlist URL
pub fn playlist_url(remote_playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", remote_playlist_id)
}

/// yt-dlp format selector for a quality preference
pub fn format_selector(quality: Quality) -> String {
    match quality.max_height() {
        Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
        None => "bestvideo+bestaudio/best".to_string(),
    }
}

/// yt-dlp output template for a rendered destination
///
/// Literal `%` is escaped and the extension is left to yt-dlp. Deferred
/// tokens in the file name become yt-dlp fields; directories are literal.
pub fn output_template(destination: &Path) -> String {
    fn escape(s: &str) -> String {
        s.replace('%', "%%")
    }

    let stem = destination
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let mapped = map_deferred_tokens(&escape(stem.as_ref()), |token| {
        match token {
            DeferredToken::Title => "%(title)s",
            DeferredToken::Id => "%(id)s",
            DeferredToken::Date => "%(upload_date)s",
        }
        .to_string()
    });
    let file = format!("{}.%(ext)s", mapped);
    match destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => Path::new(&escape(dir.to_string_lossy().as_ref()))
            .join(file)
            .to_string_lossy()
            .into_owned(),
        None => file,
    }
}

/// CLI handler driving the `yt-dlp` binary
///
/// ```no_run
/// use tubarr::ytdlp::YtDlp;
///
/// let ytdlp = YtDlp::from_path().expect("yt-dlp not found in PATH");
/// ```
#[derive(Clone, Debug)]
pub struct YtDlp {
    binary_path: PathBuf,
    extra_args: Vec<String>,
}

impl YtDlp {
    /// Create a handler with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            extra_args: vec![],
        }
    }

    /// Attempt to find `yt-dlp` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build a handler from the tools configuration
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        let handler = match &tools.ytdlp_path {
            Some(path) => Self::new(path.clone()),
            None if tools.search_path => Self::from_path().ok_or_else(|| {
                Error::ExternalTool("yt-dlp not found in PATH".to_string())
            })?,
            None => {
                return Err(Error::Config {
                    message: "ytdlp_path is not set and PATH search is disabled".to_string(),
                    key: Some("ytdlp_path".to_string()),
                });
            }
        };
        Ok(handler.with_extra_args(tools.extra_args.clone()))
    }

    /// Append arguments to every invocation
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Path of the binary this handler runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.extra_args)
            .arg("--no-warnings")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> FetchError {
        FetchError::Spawn(format!(
            "failed to execute {}: {}",
            self.binary_path.display(),
            e
        ))
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> std::result::Result<T, FetchError> {
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(classify_failure(
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::MalformedOutput(e.to_string()))
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch(
        &self,
        request: &FetchRequest<'_>,
        cancel: &CancellationToken,
    ) -> std::result::Result<FetchedVideo, FetchError> {
        let template = output_template(request.destination);
        let format = format_selector(request.quality);
        let url = video_url(request.remote_id);

        tracing::debug!(remote_id = %request.remote_id, template = %template, format = %format, "running yt-dlp");

        let child = self
            .command()
            .args([
                "--no-simulate",
                "--no-progress",
                "--no-playlist",
                "-f",
                format.as_str(),
                "--merge-output-format",
                MERGE_FORMAT,
                "-o",
                template.as_str(),
                "-O",
                PRINT_AFTER_MOVE,
                url.as_str(),
            ])
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // dropping the child on cancellation kills it
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            output = child.wait_with_output() => output.map_err(|e| self.spawn_error(e))?,
        };

        if !output.status.success() {
            return Err(classify_failure(
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        parse_fetch_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl RemoteListing for YtDlp {
    async fn channel_info(&self, url: &str) -> std::result::Result<ChannelInfo, FetchError> {
        let raw: ChannelJson = self
            .run_json(&["--flat-playlist", "-J", "--playlist-items", "0", url])
            .await?;
        raw.into_info(url)
    }

    fn list_channel_videos(
        &self,
        remote_channel_id: &str,
    ) -> BoxStream<'static, std::result::Result<RemoteVideo, FetchError>> {
        let url = format!("{}/videos", channel_url(remote_channel_id));
        let handler = self.clone();
        stream::unfold(ListingState::Start { handler, url }, next_listing_entry).boxed()
    }

    async fn list_playlist_videos(
        &self,
        remote_playlist_id: &str,
    ) -> std::result::Result<Vec<RemoteVideo>, FetchError> {
        let raw: PlaylistJson = self
            .run_json(&["--flat-playlist", "-J", &playlist_url(remote_playlist_id)])
            .await?;
        Ok(raw
            .entries
            .into_iter()
            .flatten()
            .filter_map(FlatEntry::into_video)
            .collect())
    }

    async fn list_channel_playlists(
        &self,
        remote_channel_id: &str,
    ) -> std::result::Result<Vec<RemotePlaylist>, FetchError> {
        let url = format!("{}/playlists", channel_url(remote_channel_id));
        let raw: PlaylistJson = self.run_json(&["--flat-playlist", "-J", &url]).await?;
        Ok(raw
            .entries
            .into_iter()
            .flatten()
            .filter_map(FlatEntry::into_playlist)
            .collect())
    }

    async fn playlist_info(
        &self,
        remote_playlist_id: &str,
    ) -> std::result::Result<RemotePlaylist, FetchError> {
        let raw: PlaylistJson = self
            .run_json(&["--flat-playlist", "-J", &playlist_url(remote_playlist_id)])
            .await?;
        let count = raw.entries.iter().flatten().count() as u32;
        Ok(RemotePlaylist {
            remote_id: raw.id.unwrap_or_else(|| remote_playlist_id.to_string()),
            title: raw.title.unwrap_or_else(|| remote_playlist_id.to_string()),
            video_count: raw.playlist_count.or(Some(count)),
            thumbnail: best_thumbnail(None, raw.thumbnails),
        })
    }
}

enum ListingState {
    Start {
        handler: YtDlp,
        url: String,
    },
    Reading {
        child: Child,
        lines: Lines<BufReader<ChildStdout>>,
        stderr: JoinHandle<String>,
    },
    Done,
}

async fn next_listing_entry(
    mut state: ListingState,
) -> Option<(std::result::Result<RemoteVideo, FetchError>, ListingState)> {
    loop {
        state = match state {
            ListingState::Done => return None,
            ListingState::Start { handler, url } => {
                let spawned = handler
                    .command()
                    .args(["--flat-playlist", "--dump-json", url.as_str()])
                    .spawn();
                let mut child = match spawned {
                    Ok(child) => child,
                    Err(e) => return Some((Err(handler.spawn_error(e)), ListingState::Done)),
                };
                let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
                else {
                    return Some((
                        Err(FetchError::Spawn("yt-dlp output pipes unavailable".to_string())),
                        ListingState::Done,
                    ));
                };
                let stderr = tokio::spawn(async move {
                    let mut buf = String::new();
                    let _ = stderr.read_to_string(&mut buf).await;
                    buf
                });
                ListingState::Reading {
                    child,
                    lines: BufReader::new(stdout).lines(),
                    stderr,
                }
            }
            ListingState::Reading {
                mut child,
                mut lines,
                stderr,
            } => match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        ListingState::Reading { child, lines, stderr }
                    } else {
                        match parse_listing_line(line) {
                            Ok(Some(video)) => {
                                return Some((Ok(video), ListingState::Reading { child, lines, stderr }));
                            }
                            Ok(None) => ListingState::Reading { child, lines, stderr },
                            Err(e) => return Some((Err(e), ListingState::Done)),
                        }
                    }
                }
                Ok(None) => {
                    let status = child.wait().await;
                    let stderr = stderr.await.unwrap_or_default();
                    return match status {
                        Ok(status) if status.success() => None,
                        Ok(status) => Some((
                            Err(classify_failure(status.code(), &stderr)),
                            ListingState::Done,
                        )),
                        Err(e) => Some((
                            Err(FetchError::Spawn(format!("failed to wait for yt-dlp: {}", e))),
                            ListingState::Done,
                        )),
                    };
                }
                Err(e) => {
                    return Some((
                        Err(FetchError::MalformedOutput(format!("unreadable listing output: {}", e))),
                        ListingState::Done,
                    ));
                }
            },
        };
    }
}

/// Map a failed yt-dlp run to a [`FetchError`]
pub fn classify_failure(status: Option<i32>, stderr: &str) -> FetchError {
    let tail = stderr_tail(stderr);
    let lower = tail.to_ascii_lowercase();
    let unavailable = [
        "video unavailable",
        "private video",
        "has been removed",
        "this channel does not exist",
        "does not exist",
        "members-only",
    ];
    if unavailable.iter().any(|marker| lower.contains(marker)) {
        let message = tail
            .lines()
            .rev()
            .find(|l| l.contains("ERROR"))
            .unwrap_or(tail)
            .trim()
            .to_string();
        return FetchError::Unavailable(message);
    }
    FetchError::ToolFailed {
        status,
        stderr: tail.trim().to_string(),
    }
}

fn stderr_tail(stderr: &str) -> &str {
    if stderr.len() <= STDERR_TAIL {
        return stderr;
    }
    let mut start = stderr.len() - STDERR_TAIL;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    &stderr[start..]
}

fn parse_upload_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

fn best_thumbnail(direct: Option<String>, list: Option<Vec<Thumbnail>>) -> Option<String> {
    direct.or_else(|| list?.into_iter().rev().find_map(|t| t.url))
}

#[derive(Debug, Deserialize)]
struct PrintedVideo {
    filepath: Option<String>,
    title: Option<String>,
    upload_date: Option<String>,
    duration: Option<f64>,
    description: Option<String>,
    thumbnail: Option<String>,
}

/// Parse the `after_move` line printed by a fetch
pub fn parse_fetch_output(stdout: &str) -> std::result::Result<FetchedVideo, FetchError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| FetchError::MalformedOutput("no metadata line in yt-dlp output".to_string()))?;
    let printed: PrintedVideo =
        serde_json::from_str(line).map_err(|e| FetchError::MalformedOutput(e.to_string()))?;
    let path = printed
        .filepath
        .filter(|p| !p.is_empty())
        .ok_or_else(|| FetchError::MalformedOutput("yt-dlp did not report a file path".to_string()))?;

    Ok(FetchedVideo {
        path: PathBuf::from(path),
        metadata: VideoMetadata {
            title: printed.title,
            upload_date: parse_upload_date(printed.upload_date.as_deref()),
            duration_secs: printed.duration.map(|d| d.round() as i64),
            description: printed.description,
            thumbnail: printed.thumbnail,
        },
    })
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    upload_date: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<Thumbnail>>,
    playlist_count: Option<u32>,
}

impl FlatEntry {
    fn into_video(self) -> Option<RemoteVideo> {
        let remote_id = self.id.filter(|id| !id.is_empty())?;
        Some(RemoteVideo {
            title: self.title.unwrap_or_else(|| remote_id.clone()),
            upload_date: parse_upload_date(self.upload_date.as_deref()),
            duration_secs: self.duration.map(|d| d.round() as i64),
            thumbnail: best_thumbnail(self.thumbnail, self.thumbnails),
            remote_id,
        })
    }

    fn into_playlist(self) -> Option<RemotePlaylist> {
        let remote_id = self.id.filter(|id| !id.is_empty())?;
        Some(RemotePlaylist {
            title: self.title.unwrap_or_else(|| remote_id.clone()),
            video_count: self.playlist_count,
            thumbnail: best_thumbnail(self.thumbnail, self.thumbnails),
            remote_id,
        })
    }
}

/// Parse one `--dump-json` line of a flat channel listing
///
/// Entries without an id yield `Ok(None)`.
pub fn parse_listing_line(line: &str) -> std::result::Result<Option<RemoteVideo>, FetchError> {
    let entry: FlatEntry =
        serde_json::from_str(line).map_err(|e| FetchError::MalformedOutput(e.to_string()))?;
    Ok(entry.into_video())
}

#[derive(Debug, Deserialize)]
struct PlaylistJson {
    id: Option<String>,
    title: Option<String>,
    playlist_count: Option<u32>,
    thumbnails: Option<Vec<Thumbnail>>,
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct ChannelJson {
    id: Option<String>,
    channel_id: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    title: Option<String>,
    channel_url: Option<String>,
    webpage_url: Option<String>,
    description: Option<String>,
    thumbnails: Option<Vec<Thumbnail>>,
}

impl ChannelJson {
    fn into_info(self, requested_url: &str) -> std::result::Result<ChannelInfo, FetchError> {
        let remote_id = self
            .channel_id
            .or(self.id)
            .ok_or_else(|| FetchError::MalformedOutput("channel id missing".to_string()))?;
        let name = self
            .channel
            .or(self.uploader)
            .or(self.title)
            .ok_or_else(|| FetchError::MalformedOutput("channel name missing".to_string()))?;
        Ok(ChannelInfo {
            url: self
                .channel_url
                .or(self.webpage_url)
                .unwrap_or_else(|| requested_url.to_string()),
            thumbnail: best_thumbnail(None, self.thumbnails),
            description: self.description.filter(|d| !d.is_empty()),
            remote_id,
            name,
        })
    }
}
