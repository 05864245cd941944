//! Engine handle split into focused submodules.
//!
//! The `Tubarr` struct and its methods are organized by domain:
//! - [`control`] - Download requests, cancellation, retry, deletion
//! - [`catalog`] - Read-side catalog queries
//! - [`sync`] - Channel and playlist listing sync, monitoring
//! - [`rescan`] - Filesystem reconciliation
//! - [`lifecycle`] - Startup recovery and shutdown coordination
//! - [`tasks`] - Single-writer dispatch of download tasks
//! - [`download_task`] - One video's download lifecycle

mod catalog;
mod control;
mod download_task;
mod lifecycle;
mod rescan;
mod sync;
mod tasks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use sync::{AddChannel, PlaylistListing, PlaylistOptions};

use crate::artwork::ArtworkClient;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetch::{MediaFetcher, RemoteListing};
use crate::naming::NameTemplate;
use crate::types::Event;
use crate::ytdlp::YtDlp;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Artwork request timeout
const ARTWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Event bus capacity
const EVENT_BUFFER: usize = 1000;

/// Dispatch and in-flight task state
#[derive(Clone)]
pub(crate) struct DispatchState {
    /// Remote video id -> cancellation token of the task that owns it.
    /// Entries are inserted under the lock before the row is claimed, so a
    /// remote id has at most one entry and therefore at most one task.
    pub(crate) in_flight: Arc<tokio::sync::Mutex<HashMap<String, CancellationToken>>>,
    /// Bounds concurrent fetches (max_concurrent_downloads)
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Cleared by shutdown; no new work is accepted afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// External capabilities the engine drives
#[derive(Clone)]
pub(crate) struct Backends {
    /// Media fetch capability
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    /// Remote listing capability
    pub(crate) listing: Arc<dyn RemoteListing>,
    /// Artwork HTTP client
    pub(crate) artwork: ArtworkClient,
}

/// Main engine handle (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Tubarr {
    /// Catalog store
    /// Public for integration tests to inspect rows directly
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Resolved naming template
    pub(crate) template: Arc<NameTemplate>,
    /// External capabilities
    pub(crate) backends: Backends,
    /// Dispatch and in-flight task state
    pub(crate) dispatch: DispatchState,
}

impl Tubarr {
    /// Create an engine backed by the `yt-dlp` binary
    ///
    /// This initializes all core components:
    /// - Validates the configuration and naming template
    /// - Locates `yt-dlp` (configured path or `PATH`)
    /// - Opens/creates the SQLite catalog and runs migrations
    /// - Re-dispatches downloads interrupted by a previous session
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ytdlp = YtDlp::from_config(&config.tools)?;
        tracing::info!(binary = %ytdlp.binary_path().display(), "using yt-dlp");

        let ytdlp = Arc::new(ytdlp);
        Self::with_backends(config, ytdlp.clone(), ytdlp).await
    }

    /// Create an engine with explicit fetch and listing capabilities
    pub async fn with_backends(
        config: Config,
        fetcher: Arc<dyn MediaFetcher>,
        listing: Arc<dyn RemoteListing>,
    ) -> Result<Self> {
        config.validate()?;
        let template = config.library.naming.template()?;

        tokio::fs::create_dir_all(config.download_root())
            .await
            .map_err(|e| Error::filesystem(config.download_root(), e))?;

        let db = Database::new(&config.persistence.database_path).await?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_BUFFER);

        let dispatch = DispatchState {
            in_flight: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(
                config.download.max_concurrent_downloads,
            )),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        let backends = Backends {
            fetcher,
            listing,
            artwork: ArtworkClient::new(ARTWORK_TIMEOUT)?,
        };

        let engine = Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            template: Arc::new(template),
            backends,
            dispatch,
        };

        let recovered = engine.recover_interrupted().await?;
        if recovered > 0 {
            tracing::info!(recovered, "re-dispatched downloads from previous session");
        }

        Ok(engine)
    }

    /// Subscribe to engine events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// Events with no subscribers are dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Fail with [`Error::ShuttingDown`] once shutdown has begun
    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self
            .dispatch
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
