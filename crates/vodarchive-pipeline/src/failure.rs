//! Classifies a stage failure as permanent or retryable, bumps the failure counter, and
//! persists the result independently of whatever cancellation signal caused the caller
//! to be driving the job in the first place (§4.6, §7).

use tracing::{error, warn};
use vodarchive_models::Job;
use vodarchive_store::JobStore;

use crate::error::PipelineError;

/// Apply the failure policy for `err` encountered while driving `job`'s current stage,
/// then persist the result on a best-effort, non-cancellable save: a cancelled root
/// context must not prevent recording the failure. Does not advance the stage — on the
/// next Dispatcher iteration a non-permanently-failed job is simply picked up again.
pub async fn apply_failure_policy(store: &JobStore, job: Job, err: &PipelineError) -> Job {
    let permanent = err.is_permanent();
    let failed = job.record_failure(err.to_string(), permanent);

    if let Err(save_err) = store.save(&failed).await {
        error!(
            vod_id = %failed.vod_id,
            error = %save_err,
            "failed to persist failure state; will be re-derived next tick"
        );
    } else if failed.failed {
        warn!(vod_id = %failed.vod_id, reason = %failed.fail_reason, "job permanently failed");
    } else {
        warn!(
            vod_id = %failed.vod_id,
            fail_count = failed.fail_count,
            "stage failed, will retry from checkpoint"
        );
    }

    failed
}
