//! Best-effort artwork downloads
//!
//! Channel posters and season posters are fetched over HTTP and written next
//! to the media. Existing files are never replaced. Callers log failures and
//! carry on.

use crate::error::{Error, Result};
use crate::naming::sidecar::write_if_absent;
use std::path::Path;
use std::time::Duration;

/// Channel poster file name
pub const POSTER: &str = "poster.jpg";

/// Season poster file name, stored in the channel directory
pub fn season_poster_name(season: u32) -> String {
    if season == 0 {
        "season-specials-poster.jpg".to_string()
    } else {
        format!("season{:02}-poster.jpg", season)
    }
}

/// HTTP client for artwork
#[derive(Clone, Debug)]
pub struct ArtworkClient {
    client: reqwest::Client,
}

impl ArtworkClient {
    /// Create a client with a request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tubarr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Download `url` to `dest` unless `dest` already exists
    ///
    /// Returns whether a file was written.
    pub async fn download_if_absent(&self, url: &str, dest: &Path) -> Result<bool> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Ok(false);
        }

        let parsed = url::Url::parse(url)
            .map_err(|e| Error::Other(format!("invalid artwork url {:?}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Other(format!(
                "unsupported artwork url scheme: {}",
                parsed.scheme()
            )));
        }

        let bytes = self
            .client
            .get(parsed)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let written = write_if_absent(dest, &bytes).await?;
        if written {
            tracing::debug!(path = %dest.display(), bytes = bytes.len(), "artwork saved");
        }
        Ok(written)
    }
}
