//! # tubarr
//!
//! Catalog and library engine for channel/playlist video collections.
//!
//! tubarr keeps a SQLite catalog of channels, playlists and videos, downloads
//! videos through `yt-dlp`, and lays them out as a TV-style library that
//! Plex/Jellyfin/Kodi can index:
//!
//! ```text
//! <root>/<Channel>/Season 01 - <Playlist>/<Channel> - S01E03 - <Title> [<id>].mkv
//! <root>/<Channel>/Specials/<Channel> - S00E01 - <Title> [<id>].mkv
//! ```
//!
//! Each monitored playlist is a season; everything else is a special. Videos
//! keep their numbering across retries and restarts, and a rescan reconciles
//! the catalog with whatever is actually on disk.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tubarr::{AddChannel, Config, Tubarr};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Tubarr::new(Config::default().with_env_overrides()).await?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let channel = engine
//!         .add_channel(AddChannel::new("https://www.youtube.com/@somechannel"))
//!         .await?;
//!     println!("added {}", channel.name);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artwork downloads
pub mod artwork;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Engine handle (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Remote fetch and listing capabilities
pub mod fetch;
/// Library paths, naming templates and sidecar documents
pub mod naming;
/// Season and episode number allocation rules
pub mod numbering;
/// Filesystem scan and catalog reconciliation planning
pub mod reconcile;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// `yt-dlp` backed fetch and listing
pub mod ytdlp;

// Re-export commonly used types
pub use config::Config;
pub use db::{Channel, Database, Playlist, Video, VideoPage};
pub use downloader::{AddChannel, PlaylistListing, PlaylistOptions, Tubarr};
pub use error::{DatabaseError, DownloadError, Error, FetchError, Result};
pub use fetch::{MediaFetcher, RemoteListing};
pub use naming::{NameTemplate, NamingPreset};
pub use types::{
    CatalogStats, ChannelId, DispatchAck, DownloadStatus, Event, PlaylistId, Quality,
    ReconcileReport, SyncReport, TaskOutcome, TaskStep, VideoFilter, VideoId, VideoQuery,
    VideoSort,
};
pub use ytdlp::YtDlp;

/// Run the engine until a termination signal, then shut it down gracefully.
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tubarr::{Config, Tubarr, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Tubarr::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(engine).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: Tubarr) -> Result<()> {
    run_until(engine, wait_for_signal()).await
}

/// Run the engine until `trigger` resolves, then shut it down gracefully
///
/// For embedders with their own shutdown source (a service manager, a
/// channel from the UI).
pub async fn run_until(engine: Tubarr, trigger: impl std::future::Future<Output = ()>) -> Result<()> {
    trigger.await;
    tracing::info!("shutdown requested");
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to Ctrl+C
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for Ctrl+C only");
            return wait_for_ctrl_c().await;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = wait_for_ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await
}

/// Resolve on Ctrl+C; never resolves if the handler cannot be installed
async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await
        }
    }
}
