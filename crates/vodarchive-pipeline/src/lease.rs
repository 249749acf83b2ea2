//! A cooperative liveness signal distinct from a mutex (§4.4). While the Dispatcher
//! drives a job, a background task refreshes `LeasedAtUtc` on its own store session so
//! it never contends with the Dispatcher's own writes to the same row.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vodarchive_models::VodId;
use vodarchive_store::JobStore;

/// How often the Lease Keeper refreshes `LeasedAtUtc` while a job is being driven.
pub const LEASE_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

/// Refreshes a job's lease on an interval until stopped. Started when the Dispatcher
/// begins driving a stage and stopped (via [`LeaseKeeper::stop`]) once that stage's
/// worker stream has drained, whether it succeeded, failed, or was cancelled.
pub struct LeaseKeeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LeaseKeeper {
    /// Spawn the background refresh loop for `vod_id`, identifying itself as `holder`.
    pub fn spawn(store: JobStore, vod_id: VodId, holder: String) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(LEASE_REFRESH_INTERVAL);
            interval.tick().await; // first tick fires immediately; the initial lease() call already recorded it

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => {
                        debug!(vod_id = %vod_id, "lease keeper stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(err) = store.refresh_lease(&vod_id, &holder, Utc::now()).await {
                            warn!(vod_id = %vod_id, error = %err, "failed to refresh lease");
                        }
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    /// Stop the refresh loop and wait for it to exit. Safe to call after the loop has
    /// already stopped on its own.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
