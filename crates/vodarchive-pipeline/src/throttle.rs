//! Rate-limits persistence of streaming status updates (§4.5).
//!
//! Status strings can arrive many times a second (ffmpeg-style progress). Persisting
//! every one would saturate the Job Store, so only one `Description` write goes through
//! per [`THROTTLE_INTERVAL`], no matter how many statuses arrived in between.

use std::time::{Duration, Instant};

use tracing::debug;
use vodarchive_models::{Job, VodId};
use vodarchive_store::JobStore;

/// Minimum time between persisted `Description` updates for a single job.
pub const THROTTLE_INTERVAL: Duration = Duration::from_secs(2);

/// Tracks the last time a status update was persisted for the job currently being driven.
/// One instance per Dispatcher drive loop iteration; not shared across jobs.
pub struct ProgressThrottle {
    last_persisted_at: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self { last_persisted_at: None }
    }

    /// Whether a status arriving at `now` should be persisted. The first status for a
    /// job always persists; subsequent ones only after [`THROTTLE_INTERVAL`] has elapsed
    /// since the last persisted one.
    pub fn should_persist(&mut self, now: Instant) -> bool {
        let due = match self.last_persisted_at {
            None => true,
            Some(last) => now.duration_since(last) >= THROTTLE_INTERVAL,
        };
        if due {
            self.last_persisted_at = Some(now);
        }
        due
    }

    /// Report one status line: update the in-memory job's `Description` and, if due,
    /// persist it. A transient store error is swallowed — progress display is soft
    /// state and must never interrupt the drive loop (§4.5).
    pub async fn report(&mut self, store: &JobStore, job: &mut Job, vod_id: &VodId, description: String) {
        job.description = description;

        if !self.should_persist(Instant::now()) {
            return;
        }

        if let Err(err) = store.save(job).await {
            debug!(vod_id = %vod_id, error = %err, "swallowed transient error persisting progress");
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_always_persists() {
        let mut throttle = ProgressThrottle::new();
        assert!(throttle.should_persist(Instant::now()));
    }

    #[test]
    fn rapid_statuses_within_window_are_suppressed() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();
        assert!(throttle.should_persist(t0));
        assert!(!throttle.should_persist(t0 + Duration::from_millis(500)));
        assert!(!throttle.should_persist(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn status_after_window_persists_again() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();
        assert!(throttle.should_persist(t0));
        assert!(throttle.should_persist(t0 + Duration::from_secs(3)));
    }

    /// S5: a worker that emits 100 statuses over 1 second persists at most one update.
    #[test]
    fn hundred_statuses_over_one_second_persist_at_most_once() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();
        let mut persisted = 0;
        for i in 0..100u32 {
            let now = t0 + Duration::from_millis((i * 10) as u64);
            if throttle.should_persist(now) {
                persisted += 1;
            }
        }
        assert_eq!(persisted, 1);
    }

    /// Invariant 5: across a run of N statuses in T seconds, persisted updates number at
    /// most ceil(T/2) + 1.
    #[test]
    fn throttling_respects_ceiling_bound() {
        let mut throttle = ProgressThrottle::new();
        let t0 = Instant::now();
        let total_seconds = 21u64;
        let mut persisted = 0;
        for ms in (0..total_seconds * 1000).step_by(100) {
            if throttle.should_persist(t0 + Duration::from_millis(ms)) {
                persisted += 1;
            }
        }
        let bound = total_seconds.div_ceil(2) + 1;
        assert!(persisted <= bound as usize, "{persisted} > {bound}");
    }
}
