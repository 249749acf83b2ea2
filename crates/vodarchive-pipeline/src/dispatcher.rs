//! The persistent stage-machine driver (§4.2): a single long-lived loop that selects
//! the highest-priority eligible job and drives it, stage by stage, to completion or
//! failure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use vodarchive_models::{Job, Stage};
use vodarchive_store::JobStore;
use vodarchive_workers::{
    ChatDownloader, ChatRenderer, FinalRenderer, StageWorker, VodDownloader, VideoUploader,
};

use crate::error::{PipelineError, PipelineResult};
use crate::failure::apply_failure_policy;
use crate::lease::LeaseKeeper;
use crate::metadata::MetadataProvider;
use crate::throttle::ProgressThrottle;

/// How long the Dispatcher sleeps between polls when no eligible job is found.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    store: JobStore,
    metadata: Arc<dyn MetadataProvider>,
    base_dir: PathBuf,
    oauth_token: String,
    holder: String,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        store: JobStore,
        metadata: Arc<dyn MetadataProvider>,
        base_dir: impl Into<PathBuf>,
        oauth_token: impl Into<String>,
        holder: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            metadata,
            base_dir: base_dir.into(),
            oauth_token: oauth_token.into(),
            holder: holder.into(),
            cancel,
        }
    }

    /// The main loop (§2, §4.2): select, drive, repeat, until cancelled.
    pub async fn run(&self) {
        loop {
            if self.cancel.is_cancelled() {
                info!("dispatcher stopping: cancellation requested");
                return;
            }

            match self.store.select_next_eligible().await {
                Ok(Some(job)) => {
                    self.drive(job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            info!("dispatcher stopping during idle poll");
                            return;
                        }
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to select next job, backing off");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    }
                }
            }
        }
    }

    /// Drive `job` forward through successive stages until it reaches `Uploaded`,
    /// fails, or the process is asked to shut down.
    #[instrument(skip(self, job), fields(vod_id = %job.vod_id))]
    async fn drive(&self, mut job: Job) {
        loop {
            if let Some(rollback_target) = job.rollback_target() {
                info!(from = ?job.stage, to = ?rollback_target, "rolling back to checkpoint with missing upstream artifact");
                job.stage = rollback_target;
                if let Err(err) = self.store.save(&job).await {
                    warn!(error = %err, "failed to persist rollback, will retry next tick");
                }
                return;
            }

            if job.stage.is_terminal_success() || job.failed {
                return;
            }

            job = job.lease(self.holder.clone(), Utc::now()).begin_active_stage();
            if let Err(err) = self.store.save(&job).await {
                warn!(error = %err, "failed to persist stage start, backing off");
                return;
            }

            let keeper = LeaseKeeper::spawn(self.store.clone(), job.vod_id.clone(), self.holder.clone());

            let outcome = self.run_active_stage(&mut job).await;
            keeper.stop().await;

            match outcome {
                Ok(()) => {
                    job = self.record_artifact_and_advance(job).await;
                    if let Err(err) = self.store.save(&job).await {
                        warn!(error = %err, "failed to persist stage completion");
                        return;
                    }
                }
                Err(err) if err.is_cancelled() => {
                    info!("stage cancelled, leaving job mid-stage for the next run");
                    return;
                }
                Err(err) => {
                    apply_failure_policy(&self.store, job, &err).await;
                    return;
                }
            }
        }
    }

    /// Build the worker for `job`'s current (active) stage and drain its status stream.
    async fn run_active_stage(&self, job: &mut Job) -> PipelineResult<()> {
        let worker = self.build_worker(job).await?;
        let child_cancel = self.cancel.child_token();

        let mut stream = worker.run(&job.vod_id, child_cancel).await?;
        let mut throttle = ProgressThrottle::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(status) => {
                    let vod_id = job.vod_id.clone();
                    throttle.report(&self.store, job, &vod_id, status).await;
                }
                Err(err) => return Err(PipelineError::from(err)),
            }
        }

        Ok(())
    }

    async fn build_worker(&self, job: &Job) -> PipelineResult<Box<dyn StageWorker>> {
        match job.stage {
            Stage::DownloadingVod => {
                let metadata = self.metadata.get_metadata(&job.vod_id).await?;
                Ok(Box::new(VodDownloader::new(&self.base_dir, metadata.source_url)))
            }
            Stage::DownloadingChat => Ok(Box::new(ChatDownloader::new(&self.base_dir))),
            Stage::RenderingChat => Ok(Box::new(ChatRenderer::new(
                &self.base_dir,
                &job.chat_text_file_path,
                &job.vod_file_path,
            ))),
            Stage::Combining => Ok(Box::new(FinalRenderer::new(
                &self.base_dir,
                &job.vod_file_path,
                &job.chat_video_file_path,
            ))),
            Stage::Uploading => {
                let metadata = self.metadata.get_metadata(&job.vod_id).await?;
                Ok(Box::new(VideoUploader::new(
                    self.store.clone(),
                    &job.final_video_file_path,
                    metadata,
                    self.oauth_token.clone(),
                )))
            }
            other => Err(PipelineError::NoWorkerForStage(other)),
        }
    }

    /// Record the artifact produced by the stage that just completed and advance to
    /// its checkpoint (§4.1, §4.2). `Uploading` is the one stage whose worker writes
    /// its artifact directly (§4.3); here it only needs re-reading and advancing.
    async fn record_artifact_and_advance(&self, job: Job) -> Job {
        let stage = job.stage;
        let advanced = match stage {
            Stage::DownloadingVod => {
                let path = VodDownloader::new(&self.base_dir, "").output_path(&job.vod_id);
                job.record_vod_file(path.to_string_lossy().into_owned())
            }
            Stage::DownloadingChat => {
                let path = ChatDownloader::new(&self.base_dir).output_path(&job.vod_id);
                job.record_chat_text_file(path.to_string_lossy().into_owned())
            }
            Stage::RenderingChat => {
                let path = ChatRenderer::new(&self.base_dir, "", "").output_path(&job.vod_id);
                job.record_chat_video_file(path.to_string_lossy().into_owned())
            }
            Stage::Combining => {
                let path = FinalRenderer::new(&self.base_dir, "", "").output_path(&job.vod_id);
                job.record_final_video_file(path.to_string_lossy().into_owned())
            }
            Stage::Uploading => match self.store.get(&job.vod_id).await {
                Ok(Some(refreshed)) => refreshed,
                _ => job,
            },
            _ => job,
        };

        advanced.advance_to_checkpoint()
    }

    /// Used by operator tooling to stop the running loop promptly.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
