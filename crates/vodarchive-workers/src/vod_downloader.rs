//! Downloads the source VOD with `yt-dlp`, `vods/{vod_id}.mp4`.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vodarchive_media::{download_video, move_file};
use vodarchive_models::VodId;

use crate::{cancelable_stream, StageWorker, StatusStream, WorkerError, WorkerResult};

pub struct VodDownloader {
    base_dir: PathBuf,
    source_url: String,
}

impl VodDownloader {
    pub fn new(base_dir: impl Into<PathBuf>, source_url: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            source_url: source_url.into(),
        }
    }
}

#[async_trait]
impl StageWorker for VodDownloader {
    fn name(&self) -> &'static str {
        "vod_downloader"
    }

    fn output_path(&self, vod_id: &VodId) -> PathBuf {
        self.base_dir.join("vods").join(format!("{}.mp4", vod_id))
    }

    async fn run(&self, vod_id: &VodId, cancel: CancellationToken) -> WorkerResult<StatusStream> {
        if self.source_url.is_empty() {
            return Err(WorkerError::MissingInput("source_url".to_string()));
        }

        let output = self.output_path(vod_id);
        // yt-dlp writes here while downloading (§6); only moved into `output` once the
        // download finishes, so a crash mid-download can never leave a truncated file at
        // the path `Job::vod_file_path` is about to record.
        let staging = self.base_dir.join("staging").join("vods").join(format!("{}.mp4", vod_id));
        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = self.source_url.clone();
        let vod_id_owned = vod_id.clone();
        let label = format!("downloading VOD {vod_id} from source");

        Ok(cancelable_stream(cancel, label, async move {
            if output.exists() {
                return Ok(());
            }
            download_video(&url, &staging).await.map_err(|err| {
                info!(vod_id = %vod_id_owned, error = %err, "VOD download failed");
                WorkerError::from(err)
            })?;
            move_file(&staging, &output).await.map_err(WorkerError::from)
        }))
    }
}
