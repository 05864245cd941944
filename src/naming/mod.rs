//! Episode path rendering
//!
//! Maps (channel, season, episode, template) to a sanitized path relative to
//! the download root:
//!
//! ```text
//! <channel>/<season dir>/<stem> [<remote id>]
//! ```
//!
//! The extension is chosen by the fetch capability. `{title}`, `{id}` and
//! `{date}` are deferred: they stay in the rendered path until metadata is
//! known, at which point [`fill_deferred_tokens`] (or the fetch tool's own
//! templating) resolves them.
//!
//! Deferred tokens are only recognized in the file name. Names coming from
//! the remote side (channel, season, title, id) lose their braces, so they
//! can never spell a token.
//!
//! The trailing ` [<remote id>]` is appended to every stem regardless of the
//! template; [`crate::reconcile::extract_remote_id`] depends on it.

pub mod sidecar;

use crate::error::{Error, Result};
use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)(?::(0+))?\}").expect("token regex should compile"));

#[allow(clippy::expect_used)]
static DEFERRED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(title|id|date)\}").expect("deferred regex should compile"));

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Name of the specials season directory
pub const SPECIALS_DIR: &str = "Specials";

/// Named template presets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPreset {
    /// `Channel - S01E02 - Title`
    #[default]
    Standard,
    /// `Channel.Name.S01E02.Title`
    Scene,
    /// `Channel - s01e02 - Title`
    Plex,
    /// User-supplied template
    Custom,
}

/// A resolved naming template
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameTemplate {
    /// [`NamingPreset::Standard`]
    Standard,
    /// [`NamingPreset::Scene`]
    Scene,
    /// [`NamingPreset::Plex`]
    Plex,
    /// Custom template text
    Custom(String),
}

impl NameTemplate {
    /// Template text with placeholders
    pub fn pattern(&self) -> &str {
        match self {
            NameTemplate::Standard => "{channel} - S{season:00}E{episode:00} - {title}",
            NameTemplate::Scene => "{channel}.S{season:00}E{episode:00}.{title}",
            NameTemplate::Plex => "{channel} - s{season:00}e{episode:00} - {title}",
            NameTemplate::Custom(template) => template,
        }
    }

    /// Render a sample episode to reject templates that produce no filename
    pub fn validate(&self) -> Result<()> {
        let sample = EpisodeName {
            channel: "Channel",
            season: 1,
            episode: 1,
            title: None,
            remote_id: "sample",
            season_name: None,
        };
        render(&sample, self).map(|_| ())
    }
}

/// Inputs for one rendered episode path
#[derive(Clone, Copy, Debug)]
pub struct EpisodeName<'a> {
    /// Channel display name (the show)
    pub channel: &'a str,
    /// Season number, 0 for specials
    pub season: u32,
    /// Episode number within the season
    pub episode: u32,
    /// Video title; `None` keeps `{title}` deferred
    pub title: Option<&'a str>,
    /// Remote video id
    pub remote_id: &'a str,
    /// Season display name (playlist title)
    pub season_name: Option<&'a str>,
}

/// Tokens resolved after metadata is known
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferredToken {
    /// `{title}`
    Title,
    /// `{id}`
    Id,
    /// `{date}` (upload date, `YYYYMMDD`)
    Date,
}

/// Values for [`fill_deferred_tokens`]
#[derive(Clone, Copy, Debug)]
pub struct DeferredValues<'a> {
    /// Video title
    pub title: &'a str,
    /// Remote video id
    pub id: &'a str,
    /// Upload date, rendered as `NA` when unknown
    pub upload_date: Option<NaiveDate>,
}

/// Strip characters that are unsafe in file names and trim whitespace
///
/// Removes `<>:"/\|?*` and control characters. Idempotent.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// [`sanitize`] for values substituted into a path, also dropping `{` and `}`
fn literal(value: &str) -> String {
    sanitize(value).replace(['{', '}'], "").trim().to_string()
}

/// Directory name for a channel
pub fn show_dir(channel: &str) -> Result<String> {
    let dir = literal(channel);
    if dir.is_empty() {
        return Err(Error::InvalidTemplate(format!(
            "channel name {:?} has no usable characters",
            channel
        )));
    }
    Ok(dir)
}

/// Directory name for a season
///
/// Season 0 is `Specials`; otherwise `Season 01` or `Season 01 - <name>`.
pub fn season_dir(season: u32, season_name: Option<&str>) -> String {
    if season == 0 {
        return SPECIALS_DIR.to_string();
    }
    match season_name.map(literal).filter(|n| !n.is_empty()) {
        Some(name) => format!("Season {:02} - {}", season, name),
        None => format!("Season {:02}", season),
    }
}

/// Render the relative path (without extension) for one episode
pub fn render(name: &EpisodeName<'_>, template: &NameTemplate) -> Result<PathBuf> {
    let channel_dir = show_dir(name.channel)?;
    let channel_token = match template {
        NameTemplate::Scene => channel_dir.replace(' ', "."),
        _ => channel_dir.clone(),
    };

    let expanded = TOKEN.replace_all(template.pattern(), |caps: &Captures<'_>| {
        let width = caps.get(2).map_or(0, |m| m.len());
        match &caps[1] {
            "channel" => channel_token.clone(),
            "season" => format!("{:0width$}", name.season, width = width),
            "episode" => format!("{:0width$}", name.episode, width = width),
            "title" if width == 0 => match name.title {
                Some(title) => literal(title),
                None => caps[0].to_string(),
            },
            _ => caps[0].to_string(),
        }
    });

    let stem = sanitize(&expanded);
    if stem.is_empty() {
        return Err(Error::InvalidTemplate(format!(
            "template {:?} renders an empty filename",
            template.pattern()
        )));
    }

    let remote_id = literal(name.remote_id);
    Ok(PathBuf::from(channel_dir)
        .join(season_dir(name.season, name.season_name))
        .join(format!("{} [{}]", stem, remote_id)))
}

/// Replace each deferred token with the value `f` returns for it
pub fn map_deferred_tokens(template: &str, mut f: impl FnMut(DeferredToken) -> String) -> String {
    DEFERRED
        .replace_all(template, |caps: &Captures<'_>| {
            let token = match &caps[1] {
                "title" => DeferredToken::Title,
                "id" => DeferredToken::Id,
                _ => DeferredToken::Date,
            };
            f(token)
        })
        .into_owned()
}

/// Substitute deferred tokens with sanitized metadata values
pub fn fill_deferred_tokens(template: &str, values: &DeferredValues<'_>) -> String {
    map_deferred_tokens(template, |token| match token {
        DeferredToken::Title => literal(values.title),
        DeferredToken::Id => literal(values.id),
        DeferredToken::Date => values
            .upload_date
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "NA".to_string()),
    })
}

/// Fill deferred tokens in the file name of a rendered destination
///
/// Directory components (including the download root) are kept verbatim.
pub fn fill_destination(destination: &Path, values: &DeferredValues<'_>) -> PathBuf {
    let stem = destination
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    destination.with_file_name(fill_deferred_tokens(stem.as_ref(), values))
}
