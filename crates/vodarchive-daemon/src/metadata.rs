//! The daemon's concrete [`MetadataProvider`]: reads `VodMetadata` the Ingestor wrote
//! into the Job Store's `vod_metadata` table. The pipeline crate only knows the trait
//! (its seam onto this read-only auxiliary data, §3); this is the one wiring-level
//! implementation of it.

use async_trait::async_trait;
use vodarchive_models::{VodId, VodMetadata};
use vodarchive_pipeline::{MetadataProvider, PipelineError, PipelineResult};
use vodarchive_store::JobStore;

pub struct StoreMetadataProvider {
    store: JobStore,
}

impl StoreMetadataProvider {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetadataProvider for StoreMetadataProvider {
    async fn get_metadata(&self, vod_id: &VodId) -> PipelineResult<VodMetadata> {
        self.store
            .get_metadata(vod_id)
            .await?
            .ok_or_else(|| PipelineError::MetadataUnavailable(vod_id.to_string(), "no metadata row".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
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

    #[tokio::test]
    async fn returns_metadata_unavailable_when_no_row_exists() {
        let provider = StoreMetadataProvider::new(in_memory_store().await);
        let err = provider.get_metadata(&VodId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, PipelineError::MetadataUnavailable(_, _)));
    }

    #[tokio::test]
    async fn returns_metadata_once_ingested() {
        let store = in_memory_store().await;
        let metadata = VodMetadata {
            vod_id: "v1".to_string(),
            channel: Channel {
                channel_id: "some_streamer".to_string(),
                display_name: "Some Streamer".to_string(),
            },
            source_url: "https://twitch.tv/videos/v1".to_string(),
            title: "Ranked Grind".to_string(),
            streamed_at: chrono::Utc::now(),
            duration_seconds: 3600,
            moments: vec![],
        };
        store.upsert_metadata(&metadata).await.unwrap();

        let provider = StoreMetadataProvider::new(store);
        let fetched = provider.get_metadata(&VodId::new("v1")).await.unwrap();
        assert_eq!(fetched.title, "Ranked Grind");
    }
}
