//! Stage worker implementations driven by the Dispatcher, one per pipeline stage.
//!
//! Every worker implements [`StageWorker`]: given a [`VodId`] and whatever upstream
//! artifact paths it needs (supplied at construction, since each worker's inputs differ
//! in shape and count), it produces a lazy, finite, non-restartable stream of
//! human-readable status lines. The output artifact's path is a pure function of
//! `VodId`, computed by `output_path` independently of whether `run` ever executes.

mod chat_downloader;
mod chat_renderer;
mod error;
mod final_renderer;
mod vod_downloader;
mod video_uploader;

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use vodarchive_models::VodId;

pub use chat_downloader::ChatDownloader;
pub use chat_renderer::ChatRenderer;
pub use error::{WorkerError, WorkerResult};
pub use final_renderer::FinalRenderer;
pub use vod_downloader::VodDownloader;
pub use video_uploader::{VideoUploader, UploadedVideo};

/// A lazy, finite sequence of status lines. Yields `Err` exactly once, as its last item,
/// if the worker fails or is cancelled; otherwise ends cleanly on success.
pub type StatusStream = Pin<Box<dyn Stream<Item = WorkerResult<String>> + Send>>;

#[async_trait]
pub trait StageWorker: Send + Sync {
    /// Name used in logging; not part of the status protocol.
    fn name(&self) -> &'static str;

    /// Deterministic output location for `vod_id`, independent of whether `run` succeeds.
    fn output_path(&self, vod_id: &VodId) -> PathBuf;

    /// Drive the stage to completion, reporting progress on the returned stream.
    /// Not restartable: call again (on a fresh instance) to retry after failure.
    async fn run(&self, vod_id: &VodId, cancel: CancellationToken) -> WorkerResult<StatusStream>;
}

/// Wrap a one-shot async operation as a status stream: emit `label` immediately, then
/// resolve to either a clean end or a single trailing `Err`, racing `cancel`.
fn cancelable_stream<F>(cancel: CancellationToken, label: String, fut: F) -> StatusStream
where
    F: std::future::Future<Output = WorkerResult<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let _ = tx.send(Ok(label)).await;

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let _ = tx.send(Err(WorkerError::Cancelled)).await;
            }

            result = fut => {
                if let Err(err) = result {
                    let _ = tx.send(Err(err)).await;
                }
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Adapt an FFmpeg progress stream (`vodarchive_media::MediaResult<String>`) onto the
/// worker status protocol.
fn from_media_stream(
    stream: impl Stream<Item = vodarchive_media::MediaResult<String>> + Send + 'static,
) -> StatusStream {
    Box::pin(stream.map(|item| item.map_err(WorkerError::from)))
}

/// Forward every item of `inner` unchanged; once it drains without an `Err`, atomically
/// move the staged output at `staging` into its final, well-known `output_path` (§6's
/// "staging/temp directories parallel to each" artifact, finalized by rename rather than
/// left written-in-place so a crash mid-write can never leave a corrupt artifact at the
/// path the job row is about to record).
fn with_staged_finalize(
    mut inner: StatusStream,
    staging: PathBuf,
    output_path: PathBuf,
) -> StatusStream {
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let mut failed = false;
        while let Some(item) = inner.next().await {
            let is_err = item.is_err();
            if tx.send(item).await.is_err() {
                return;
            }
            if is_err {
                failed = true;
                break;
            }
        }

        if !failed {
            if let Err(err) = vodarchive_media::move_file(&staging, &output_path).await {
                let _ = tx.send(Err(WorkerError::from(err))).await;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
