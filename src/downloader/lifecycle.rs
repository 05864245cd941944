//! Startup and shutdown coordination.

use crate::error::Result;
use crate::types::{DownloadStatus, Event};
use std::sync::atomic::Ordering;

use super::Tubarr;

impl Tubarr {
    /// Gracefully shut down the engine
    ///
    /// 1. Stops accepting new requests
    /// 2. Cancels every running task
    /// 3. Waits for tasks to leave the registry, up to `download.shutdown_timeout`
    ///
    /// Interrupted tasks leave their row `queued`, so the next
    /// [`Tubarr::new`] picks them up again.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.dispatch.accepting_new.store(false, Ordering::SeqCst);
        self.cancel_all().await;

        let timeout = self.config.download.shutdown_timeout;
        match tokio::time::timeout(timeout, self.wait_for_tasks()).await {
            Ok(()) => tracing::info!("All download tasks finished"),
            Err(_) => tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Timeout waiting for download tasks, proceeding with shutdown"
            ),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn cancel_all(&self) {
        let in_flight = self.dispatch.in_flight.lock().await;
        tracing::debug!(active_count = in_flight.len(), "Cancelling download tasks");
        for (remote_id, token) in in_flight.iter() {
            tracing::debug!(%remote_id, "Signaling cancellation");
            token.cancel();
        }
    }

    async fn wait_for_tasks(&self) {
        loop {
            let active_count = self.dispatch.in_flight.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for download tasks to finish");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Re-dispatch rows a previous session left `queued` or `downloading`
    ///
    /// Returns how many tasks were started.
    pub(crate) async fn recover_interrupted(&self) -> Result<usize> {
        let rows = self
            .db
            .list_videos_by_status(&[DownloadStatus::Downloading, DownloadStatus::Queued])
            .await?;

        let mut resumed = 0;
        for video in rows {
            let dispatched = self.dispatch(&video, None).await?;
            if matches!(dispatched.ack, crate::types::DispatchAck::Queued(_)) {
                tracing::debug!(remote_id = %video.remote_id, "resuming interrupted download");
                resumed += 1;
            }
        }
        Ok(resumed)
    }
}
