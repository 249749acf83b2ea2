//! Failure classification for stage workers: retryable by default, permanent when a
//! retry could never succeed.

use thiserror::Error;

use vodarchive_media::MediaError;
use vodarchive_store::StoreError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("missing required input artifact: {0}")]
    MissingInput(String),

    /// The source reports the chat log is structurally gone (VOD not found, chat
    /// disabled). Retrying cannot produce a different answer.
    #[error("chat log unavailable: {0}")]
    ChatUnavailable(String),

    /// A CLI invocation failed for a reason that may well not recur (rate limit,
    /// transient network blip, a process that crashed once). Retryable.
    #[error("chat tool failed: {0}")]
    ChatToolFailed(String),

    /// The upload host rejected the request for a reason a retry cannot fix: bad/expired
    /// credentials or a response that doesn't parse as the documented success shape.
    #[error("upload rejected: {0}")]
    UploadRejected(String),

    /// The upload attempt itself failed transiently: connect/timeout, or the host
    /// returned a 5xx. Retryable.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Only `VideoUploader` touches the store directly (§4.3's side effect); a failure
    /// recording the uploaded id is retryable like any other transient worker error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;

impl WorkerError {
    /// Structurally impossible to succeed on retry: missing required input, a source
    /// reporting the video/account is gone, or credentials that will never appear on
    /// their own. Everything else defaults to retryable.
    pub fn is_permanent(&self) -> bool {
        match self {
            WorkerError::MissingInput(_) | WorkerError::ChatUnavailable(_) => true,
            WorkerError::UploadRejected(_) => true,
            WorkerError::Media(err) => err.is_permanent(),
            WorkerError::Cancelled
            | WorkerError::ChatToolFailed(_)
            | WorkerError::UploadFailed(_)
            | WorkerError::Io(_)
            | WorkerError::Json(_)
            | WorkerError::Store(_) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled | WorkerError::Media(MediaError::Cancelled))
    }
}
