//! Core types for tubarr

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Generates an `i64`-backed row id newtype with the conversions and sqlx
/// bindings every catalog id needs.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

/// Stores a string-valued enum as TEXT using its `as_str`/`FromStr` pair.
macro_rules! text_column {
    ($name:ident) => {
        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <&str as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(raw.parse::<$name>()?)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

row_id!(
    /// Catalog id of a channel
    ChannelId
);
row_id!(
    /// Catalog id of a playlist
    PlaylistId
);
row_id!(
    /// Catalog id of a video
    VideoId
);

/// A stored enum value that does not match any variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    /// Which enum was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

/// Download status of a catalog video
///
/// Stored as its lowercase name. Every status write goes through
/// [`DownloadStatus::can_transition_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Known, not on disk, not requested (also: file went missing)
    Pending,
    /// Discovered by a channel sync, not requested
    Available,
    /// Requested, waiting for a download slot
    Queued,
    /// Fetch in progress
    Downloading,
    /// File is on disk
    Completed,
    /// Last fetch attempt failed
    Failed,
}

impl DownloadStatus {
    /// Every status, in lifecycle order
    pub const ALL: [DownloadStatus; 6] = [
        DownloadStatus::Pending,
        DownloadStatus::Available,
        DownloadStatus::Queued,
        DownloadStatus::Downloading,
        DownloadStatus::Completed,
        DownloadStatus::Failed,
    ];

    /// Lowercase storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Available => "available",
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        match self {
            // requested, or found on disk by a rescan
            Pending | Available | Failed => matches!(next, Queued | Completed),
            // started, cancelled before start, or failed before the fetch
            Queued => matches!(next, Downloading | Pending | Failed),
            // finished, cancelled, or re-queued by startup recovery
            Downloading => matches!(next, Completed | Failed | Pending | Queued),
            // file removed externally
            Completed => matches!(next, Pending),
        }
    }

    /// All statuses that may transition into `next`
    pub fn sources_of(next: DownloadStatus) -> Vec<DownloadStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// A task owns the row (queued or downloading)
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DownloadStatus::Queued | DownloadStatus::Downloading)
    }

    /// The file is expected on disk
    pub fn is_downloaded(&self) -> bool {
        matches!(self, DownloadStatus::Completed)
    }
}

impl FromStr for DownloadStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "download status",
                value: s.to_string(),
            })
    }
}

text_column!(DownloadStatus);

/// Video quality preference
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    /// Up to 2160p
    #[serde(rename = "2160p")]
    P2160,
    /// Up to 1080p (default)
    #[default]
    #[serde(rename = "1080p")]
    P1080,
    /// Up to 720p
    #[serde(rename = "720p")]
    P720,
    /// Up to 480p
    #[serde(rename = "480p")]
    P480,
    /// Best available
    #[serde(rename = "best")]
    Best,
}

impl Quality {
    /// Storage name, identical to the serde name
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::P2160 => "2160p",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::Best => "best",
        }
    }

    /// Maximum video height, `None` for [`Quality::Best`]
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Quality::P2160 => Some(2160),
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::Best => None,
        }
    }
}

impl FromStr for Quality {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2160p" => Ok(Quality::P2160),
            "1080p" => Ok(Quality::P1080),
            "720p" => Ok(Quality::P720),
            "480p" => Ok(Quality::P480),
            "best" => Ok(Quality::Best),
            other => Err(ParseEnumError {
                kind: "quality",
                value: other.to_string(),
            }),
        }
    }
}

text_column!(Quality);

/// Aggregate counts for a sync or batch download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Remote entries not previously in the catalog
    pub discovered: usize,
    /// Download tasks that ran to completion
    pub succeeded: usize,
    /// Download tasks started in the background without waiting for them
    pub dispatched: usize,
    /// Entries that needed no work (already downloaded or in flight)
    pub skipped: usize,
    /// Download tasks that failed or were cancelled
    pub failed: usize,
}

impl SyncReport {
    /// Fold one task outcome into the counts
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed { .. } => self.succeeded += 1,
            TaskOutcome::Skipped { .. } => self.skipped += 1,
            TaskOutcome::Failed { .. } | TaskOutcome::Cancelled { .. } => self.failed += 1,
        }
    }

    /// Fold a dispatch acknowledgment into the counts
    pub fn record_dispatch(&mut self, ack: &DispatchAck) {
        match ack {
            DispatchAck::Queued(_) => self.dispatched += 1,
            DispatchAck::AlreadyInFlight(_) | DispatchAck::AlreadyCompleted(_) => {
                self.skipped += 1
            }
        }
    }
}

/// Result of reconciling one channel against the disk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Existing rows whose status or path changed
    pub updated: usize,
    /// Rows created for files that were not in the catalog
    pub imported: usize,
}

impl ReconcileReport {
    /// Total catalog mutations
    pub fn mutations(&self) -> usize {
        self.updated + self.imported
    }
}

/// Synchronous acknowledgment of a download request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "video_id", rename_all = "snake_case")]
pub enum DispatchAck {
    /// A task was dispatched
    Queued(VideoId),
    /// Another task already owns this video
    AlreadyInFlight(VideoId),
    /// The file is already on disk
    AlreadyCompleted(VideoId),
}

impl DispatchAck {
    /// Catalog id of the video concerned
    pub fn video_id(&self) -> VideoId {
        match self {
            DispatchAck::Queued(id)
            | DispatchAck::AlreadyInFlight(id)
            | DispatchAck::AlreadyCompleted(id) => *id,
        }
    }
}

/// Steps of a download task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStep {
    /// Claiming the row for this task
    Claim,
    /// Season/episode assignment
    Placement,
    /// Path template rendering
    Render,
    /// External media fetch
    Fetch,
    /// Recording the result in the catalog
    Persist,
    /// Writing sidecar documents
    Sidecar,
    /// Downloading artwork
    Artwork,
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStep::Claim => "claim",
            TaskStep::Placement => "placement",
            TaskStep::Render => "render",
            TaskStep::Fetch => "fetch",
            TaskStep::Persist => "persist",
            TaskStep::Sidecar => "sidecar",
            TaskStep::Artwork => "artwork",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one download task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// File fetched and recorded
    Completed {
        /// Video row
        video_id: VideoId,
        /// Final file path
        path: PathBuf,
    },
    /// A fatal step failed; the row is `failed`
    Failed {
        /// Video row
        video_id: VideoId,
        /// Step that failed
        step: TaskStep,
        /// Error message recorded on the row
        error: String,
    },
    /// The cancellation token fired
    Cancelled {
        /// Video row
        video_id: VideoId,
    },
    /// Nothing to do: the row was completed or owned by another task
    Skipped {
        /// Video row
        video_id: VideoId,
    },
}

impl TaskOutcome {
    /// Catalog id of the video concerned
    pub fn video_id(&self) -> VideoId {
        match self {
            TaskOutcome::Completed { video_id, .. }
            | TaskOutcome::Failed { video_id, .. }
            | TaskOutcome::Cancelled { video_id }
            | TaskOutcome::Skipped { video_id } => *video_id,
        }
    }
}

/// Event emitted by the engine
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Download task dispatched
    DownloadQueued {
        /// Video row
        video_id: VideoId,
        /// Remote video id
        remote_id: String,
        /// Owning channel
        channel_id: ChannelId,
    },

    /// Fetch about to start
    DownloadStarted {
        /// Video row
        video_id: VideoId,
        /// Remote video id
        remote_id: String,
        /// Assigned season
        season: u32,
        /// Assigned episode
        episode: u32,
    },

    /// Download finished and recorded
    DownloadCompleted {
        /// Video row
        video_id: VideoId,
        /// Remote video id
        remote_id: String,
        /// Final file path
        path: PathBuf,
    },

    /// Download failed
    DownloadFailed {
        /// Video row
        video_id: VideoId,
        /// Remote video id
        remote_id: String,
        /// Step that failed
        step: TaskStep,
        /// Error message
        error: String,
    },

    /// Download cancelled
    DownloadCancelled {
        /// Video row
        video_id: VideoId,
        /// Remote video id
        remote_id: String,
    },

    /// Video removed from the catalog
    VideoDeleted {
        /// Video row
        video_id: VideoId,
        /// Remote video id
        remote_id: String,
    },

    /// Channel added to the catalog
    ChannelAdded {
        /// Channel row
        channel_id: ChannelId,
        /// Display name
        name: String,
    },

    /// Channel listing synced
    ChannelSynced {
        /// Channel row
        channel_id: ChannelId,
        /// Counts
        report: SyncReport,
    },

    /// Playlist synced and downloaded
    PlaylistSynced {
        /// Playlist row
        playlist_id: PlaylistId,
        /// Counts
        report: SyncReport,
    },

    /// Channel reconciled against disk
    RescanComplete {
        /// Channel row
        channel_id: ChannelId,
        /// Counts
        report: ReconcileReport,
    },

    /// Engine shutting down
    Shutdown,
}

/// Which videos a catalog listing returns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFilter {
    /// Every video
    #[default]
    All,
    /// Videos with a file on disk
    Downloaded,
    /// Videos without a file on disk
    Available,
}

/// Ordering of a catalog listing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoSort {
    /// Newest first
    #[default]
    DateDesc,
    /// Oldest first
    DateAsc,
    /// Alphabetical by title
    Title,
}

/// Paged query over one channel's videos
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoQuery {
    /// Filter
    pub filter: VideoFilter,
    /// Ordering
    pub sort: VideoSort,
    /// Page size
    pub limit: u32,
    /// Rows to skip
    pub offset: u32,
}

impl Default for VideoQuery {
    fn default() -> Self {
        Self {
            filter: VideoFilter::All,
            sort: VideoSort::DateDesc,
            limit: 25,
            offset: 0,
        }
    }
}

/// Catalog-wide counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    /// Channels in the catalog
    pub channels: i64,
    /// Videos in the catalog
    pub videos: i64,
    /// Videos with a file on disk
    pub downloaded: i64,
}
