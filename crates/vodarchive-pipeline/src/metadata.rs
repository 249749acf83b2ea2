//! The auxiliary, read-only `VodMetadata` the Dispatcher consults to build stage
//! workers (a source URL for `VodDownloader`, a title/description/tags for
//! `VideoUploader`) and never writes. How metadata is actually stored — alongside the
//! ingestor that captured it — is external to this crate (§1); this trait is the seam.

use async_trait::async_trait;
use vodarchive_models::{VodId, VodMetadata};

use crate::error::PipelineResult;

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_metadata(&self, vod_id: &VodId) -> PipelineResult<VodMetadata>;
}
