//! Pipeline-level error type: the Dispatcher's own boundary, composed from the store
//! and worker crates' typed errors.

use thiserror::Error;

use vodarchive_store::StoreError;
use vodarchive_workers::WorkerError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("no stage worker registered for stage '{0:?}'")]
    NoWorkerForStage(vodarchive_models::Stage),

    #[error("VOD metadata unavailable for '{0}': {1}")]
    MetadataUnavailable(String, String),
}

impl PipelineError {
    /// `OperationCanceled`-equivalent: shutdown, not a failure (§4.6, §7).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Worker(err) if err.is_cancelled())
    }

    /// Whether retrying this job could never succeed (§4.6).
    pub fn is_permanent(&self) -> bool {
        match self {
            PipelineError::Worker(err) => err.is_permanent(),
            PipelineError::Store(_) => false,
            PipelineError::NoWorkerForStage(_) => true,
            PipelineError::MetadataUnavailable(_, _) => true,
        }
    }
}
