//! Download task execution -- one video's lifecycle from `queued` to a terminal status.
//!
//! Split into focused submodules:
//! - [`context`] - Shared task state, per-step results, registry cleanup
//! - [`orchestration`] - Claim, placement, render and fetch
//! - [`finalization`] - Persisting the result, sidecars, artwork, failure and cancellation

mod context;
mod finalization;
mod orchestration;


pub(crate) use context::{DownloadTaskContext, PlaylistSlot};
pub(crate) use finalization::date_timestamp;
pub(crate) use orchestration::run_download_task;
