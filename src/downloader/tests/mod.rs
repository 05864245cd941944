use super::test_helpers::*;
use super::*;
use crate::error::{DownloadError, FetchError};
use crate::types::{DispatchAck, DownloadStatus, TaskOutcome, TaskStep};
use std::path::Path;

mod control;
mod lifecycle;

/// Read a file that must exist
fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

/// Drain already-buffered events
fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
