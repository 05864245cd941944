//! Kodi-style `.nfo` sidecar documents
//!
//! Show (`tvshow.nfo`) and season (`season.nfo`) documents are written once and
//! never overwritten; the episode document next to each media file is replaced
//! on every completed download.

use crate::error::{Error, Result};
use chrono::NaiveDate;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Show document file name
pub const TVSHOW_NFO: &str = "tvshow.nfo";

/// Season document file name
pub const SEASON_NFO: &str = "season.nfo";

/// Studio written into show and episode documents
pub const STUDIO: &str = "YouTube";

/// `tvshow.nfo` content
#[derive(Clone, Debug, Default)]
pub struct ShowInfo {
    /// Channel name
    pub title: String,
    /// Channel description
    pub plot: Option<String>,
    /// Date the channel was added
    pub premiered: Option<NaiveDate>,
}

/// `season.nfo` content
#[derive(Clone, Debug, Default)]
pub struct SeasonInfo {
    /// Playlist title, or `Specials`
    pub title: String,
    /// Season number
    pub season_number: u32,
    /// Season description
    pub plot: Option<String>,
}

/// Episode document content
#[derive(Clone, Debug, Default)]
pub struct EpisodeInfo {
    /// Video title
    pub title: String,
    /// Channel name
    pub show_title: String,
    /// Season number
    pub season: u32,
    /// Episode number
    pub episode: u32,
    /// Video description
    pub plot: Option<String>,
    /// Upload date
    pub aired: Option<NaiveDate>,
    /// Thumbnail URL
    pub thumb: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<i64>,
    /// Remote video id
    pub unique_id: String,
}

type XmlWriter = Writer<Vec<u8>>;

fn start(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(|e| Error::Sidecar(e.to_string()))
}

fn end(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(|e| Error::Sidecar(e.to_string()))
}

fn element(writer: &mut XmlWriter, tag: &str, value: &str) -> Result<()> {
    start(writer, tag)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| Error::Sidecar(e.to_string()))?;
    end(writer, tag)
}

fn optional(writer: &mut XmlWriter, tag: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !v.is_empty() => element(writer, tag, v),
        _ => Ok(()),
    }
}

fn document(root: &str, body: impl FnOnce(&mut XmlWriter) -> Result<()>) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(|e| Error::Sidecar(e.to_string()))?;
    start(&mut writer, root)?;
    body(&mut writer)?;
    end(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Sidecar(e.to_string()))
}

fn date(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Render `tvshow.nfo`
pub fn show_document(info: &ShowInfo) -> Result<String> {
    document("tvshow", |w| {
        element(w, "title", &info.title)?;
        optional(w, "plot", info.plot.as_deref())?;
        element(w, "studio", STUDIO)?;
        optional(w, "premiered", date(info.premiered).as_deref())
    })
}

/// Render `season.nfo`
pub fn season_document(info: &SeasonInfo) -> Result<String> {
    document("season", |w| {
        element(w, "title", &info.title)?;
        element(w, "seasonnumber", &info.season_number.to_string())?;
        optional(w, "plot", info.plot.as_deref())
    })
}

/// Render the episode document
///
/// `runtime` is in whole minutes, rounded up.
pub fn episode_document(info: &EpisodeInfo) -> Result<String> {
    document("episodedetails", |w| {
        element(w, "title", &info.title)?;
        element(w, "showtitle", &info.show_title)?;
        element(w, "season", &info.season.to_string())?;
        element(w, "episode", &info.episode.to_string())?;
        optional(w, "plot", info.plot.as_deref())?;
        optional(w, "aired", date(info.aired).as_deref())?;
        element(w, "studio", STUDIO)?;
        optional(w, "thumb", info.thumb.as_deref())?;
        if let Some(secs) = info.duration_secs.filter(|s| *s > 0) {
            element(w, "runtime", &((secs + 59) / 60).to_string())?;
        }
        w.write_event(Event::Start(
            BytesStart::new("uniqueid").with_attributes([("type", "youtube"), ("default", "true")]),
        ))
        .map_err(|e| Error::Sidecar(e.to_string()))?;
        w.write_event(Event::Text(BytesText::new(&info.unique_id)))
            .map_err(|e| Error::Sidecar(e.to_string()))?;
        end(w, "uniqueid")
    })
}

/// Episode document path for a media file
pub fn episode_path(media: &Path) -> PathBuf {
    media.with_extension("nfo")
}

/// Write `contents` unless `path` already exists
///
/// Returns whether the file was written. Creation is exclusive, so of two
/// concurrent writers exactly one wins. A failed write removes the file it
/// created, so a later call can try again.
pub async fn write_if_absent(path: &Path, contents: impl AsRef<[u8]>) -> Result<bool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::filesystem(parent, e))?;
    }
    let file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(Error::filesystem(path, e)),
    };
    fill_or_remove(file, path, contents.as_ref()).await?;
    Ok(true)
}

/// Write into a freshly created `path`, deleting it if the write fails
async fn fill_or_remove<W>(mut file: W, path: &Path, contents: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(contents).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);
    if let Err(e) = written {
        if let Err(remove) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %remove, "failed to remove partial file");
        }
        return Err(Error::filesystem(path, e));
    }
    Ok(())
}

/// Write `contents` to `path`, replacing any existing file
pub async fn write_replace(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::filesystem(parent, e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::filesystem(path, e))
}
