//! Periodic deletion of old attachments.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::ErrorHandler;
use crate::error::BusError;
use crate::ports::AttachmentStore;

/// Every `interval`, delete attachments older than `interval` until shutdown.
///
/// Failures are reported and the next tick tries again.
pub async fn cleanup_task(
    store: Arc<dyn AttachmentStore>,
    interval: Duration,
    error_handler: ErrorHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cleanup_interval.tick() => {
                match store.delete_older_than(interval).await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed = removed, "Cleaned up old attachments"),
                    Err(err) => {
                        warn!(error = %err, "Attachment cleanup failed");
                        error_handler(&BusError::Transport(err));
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
