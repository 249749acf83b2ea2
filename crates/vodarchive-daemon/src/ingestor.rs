//! C7, the Ingestor (spec.md §2, §9): periodically discovers new VODs on the source
//! platform and inserts them into the Job Store as `Pending` jobs. The actual discovery
//! logic — scanning configured `Channel`s on the source platform for VODs not yet
//! archived — is explicitly out of scope (§1): it is an external collaborator this
//! crate wires up via a trait seam, not a business-logic surface of the Job Pipeline.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vodarchive_models::{Job, VodMetadata};
use vodarchive_store::{JobStore, StoreError};

/// Discovers VODs that should be archived. Implementations talk to whatever the source
/// platform's API looks like; that logic lives outside this crate.
#[async_trait]
pub trait VodSource: Send + Sync {
    async fn discover_new_vods(&self) -> anyhow::Result<Vec<VodMetadata>>;
}

/// A source that never finds anything. Stands in until a real platform-scanning
/// collaborator is wired up; keeps the Ingestor loop's scheduling and persistence
/// logic exercisable without one.
pub struct NullVodSource;

#[async_trait]
impl VodSource for NullVodSource {
    async fn discover_new_vods(&self) -> anyhow::Result<Vec<VodMetadata>> {
        Ok(Vec::new())
    }
}

/// Drives a [`VodSource`] on a fixed interval, inserting a `Pending` job and its
/// metadata row for every VOD the source reports that isn't already known.
pub struct Ingestor<S: VodSource> {
    source: S,
    store: JobStore,
    interval: Duration,
}

impl<S: VodSource> Ingestor<S> {
    pub fn new(source: S, store: JobStore, interval: Duration) -> Self {
        Self { source, store, interval }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if let Err(err) = self.tick().await {
                warn!(error = %err, "ingestor tick failed, will retry next interval");
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("ingestor stopping: cancellation requested");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let discovered = self.source.discover_new_vods().await?;

        for metadata in discovered {
            let job = Job::new(metadata.vod_id.clone());
            match self.store.insert(&job).await {
                Ok(()) => {
                    self.store.upsert_metadata(&metadata).await?;
                    info!(vod_id = %metadata.vod_id, "ingested new VOD");
                }
                Err(StoreError::AlreadyExists(_)) => {
                    // Already known; the source may re-report it on every scan.
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vodarchive_models::Channel;

    async fn in_memory_store() -> JobStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("../vodarchive-store/migrations").run(&pool).await.unwrap();
        JobStore::from_pool(pool)
    }

    fn sample_metadata(vod_id: &str) -> VodMetadata {
        VodMetadata {
            vod_id: vod_id.to_string(),
            channel: Channel {
                channel_id: "chan".to_string(),
                display_name: "Chan".to_string(),
            },
            source_url: format!("https://twitch.tv/videos/{vod_id}"),
            title: "Stream".to_string(),
            streamed_at: chrono::Utc::now(),
            duration_seconds: 1200,
            moments: vec![],
        }
    }

    struct FixedSource {
        metadata: Vec<VodMetadata>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VodSource for FixedSource {
        async fn discover_new_vods(&self) -> anyhow::Result<Vec<VodMetadata>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.metadata.clone())
        }
    }

    #[tokio::test]
    async fn null_source_discovers_nothing() {
        let source = NullVodSource;
        assert!(source.discover_new_vods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_inserts_pending_job_and_metadata_for_new_vods() {
        let store = in_memory_store().await;
        let source = FixedSource {
            metadata: vec![sample_metadata("v1")],
            calls: AtomicUsize::new(0),
        };
        let ingestor = Ingestor::new(source, store.clone(), Duration::from_secs(1));

        ingestor.tick().await.unwrap();

        let job = store.get(&vodarchive_models::VodId::new("v1")).await.unwrap().unwrap();
        assert_eq!(job.stage, vodarchive_models::Stage::Pending);
        let metadata = store.get_metadata(&vodarchive_models::VodId::new("v1")).await.unwrap().unwrap();
        assert_eq!(metadata.title, "Stream");
    }

    #[tokio::test]
    async fn tick_is_idempotent_for_already_known_vods() {
        let store = in_memory_store().await;
        let source = FixedSource {
            metadata: vec![sample_metadata("v1")],
            calls: AtomicUsize::new(0),
        };
        let ingestor = Ingestor::new(source, store.clone(), Duration::from_secs(1));

        ingestor.tick().await.unwrap();
        ingestor.tick().await.unwrap();

        assert!(store.get(&vodarchive_models::VodId::new("v1")).await.unwrap().is_some());
    }
}
