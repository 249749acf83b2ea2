//! Composites the source VOD and the rendered chat overlay into the final upload,
//! `finals/{vod_id}_final.mp4`.
//!
//! Picks the best available hardware encoder (AMD, then NVIDIA, then Intel, falling
//! back to software) since this is by far the heaviest encode in the pipeline.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vodarchive_media::{probe_video, select_encoder, FfmpegCommand, FfmpegRunner};
use vodarchive_models::VodId;

use crate::{from_media_stream, with_staged_finalize, StageWorker, StatusStream, WorkerError, WorkerResult};

pub struct FinalRenderer {
    base_dir: PathBuf,
    vod_mp4_path: PathBuf,
    chat_mp4_path: PathBuf,
}

impl FinalRenderer {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        vod_mp4_path: impl Into<PathBuf>,
        chat_mp4_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            vod_mp4_path: vod_mp4_path.into(),
            chat_mp4_path: chat_mp4_path.into(),
        }
    }

    /// Staging location ffmpeg writes to while the encode is in flight (§6); only moved
    /// into `output_path` once the encode finishes cleanly.
    fn staging_path(&self, vod_id: &VodId) -> PathBuf {
        self.base_dir.join("staging").join("finals").join(format!("{}_final.mp4", vod_id))
    }
}

#[async_trait]
impl StageWorker for FinalRenderer {
    fn name(&self) -> &'static str {
        "final_renderer"
    }

    fn output_path(&self, vod_id: &VodId) -> PathBuf {
        self.base_dir.join("finals").join(format!("{}_final.mp4", vod_id))
    }

    async fn run(&self, vod_id: &VodId, cancel: CancellationToken) -> WorkerResult<StatusStream> {
        if self.vod_mp4_path.as_os_str().is_empty() || !self.vod_mp4_path.exists() {
            return Err(WorkerError::MissingInput("vod_mp4".to_string()));
        }
        if self.chat_mp4_path.as_os_str().is_empty() || !self.chat_mp4_path.exists() {
            return Err(WorkerError::MissingInput("chat_mp4".to_string()));
        }

        let output = self.output_path(vod_id);
        let staging = self.staging_path(vod_id);
        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Re-probe so the side-by-side layout matches the source height exactly; the
        // chat overlay was rendered against this same measurement in `ChatRenderer`.
        let source_info = probe_video(&self.vod_mp4_path).await.map_err(WorkerError::from)?;
        let encoder = select_encoder().await;

        let cmd = FfmpegCommand::new(&self.vod_mp4_path, &staging)
            .input_arg("-i")
            .input_arg(self.chat_mp4_path.to_string_lossy().to_string())
            .filter_complex(format!(
                "[0:v]scale=-2:{h}[vod];[vod][1:v]hstack=inputs=2[outv]",
                h = source_info.height
            ))
            .output_arg("-map")
            .output_arg("[outv]")
            .output_arg("-map")
            .output_arg("0:a?")
            .video_codec(encoder)
            .audio_codec("aac");

        let runner = FfmpegRunner::new(cancel);
        let stream = runner.run(&cmd).await.map_err(WorkerError::from)?;
        Ok(with_staged_finalize(from_media_stream(stream), staging, output))
    }
}
