//! Downloads the chat log for a VOD with `TwitchDownloaderCLI chatdownload`,
//! `chats/{vod_id}.json`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use vodarchive_media::move_file;
use vodarchive_models::VodId;

use crate::{cancelable_stream, StageWorker, StatusStream, WorkerError, WorkerResult};

pub struct ChatDownloader {
    base_dir: PathBuf,
}

impl ChatDownloader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl StageWorker for ChatDownloader {
    fn name(&self) -> &'static str {
        "chat_downloader"
    }

    fn output_path(&self, vod_id: &VodId) -> PathBuf {
        self.base_dir.join("chats").join(format!("{}.json", vod_id))
    }

    async fn run(&self, vod_id: &VodId, cancel: CancellationToken) -> WorkerResult<StatusStream> {
        let output = self.output_path(vod_id);
        // TwitchDownloaderCLI writes here while the chat log streams in (§6); only
        // moved into `output` once the download finishes cleanly.
        let staging = self.base_dir.join("staging").join("chats").join(format!("{}.json", vod_id));
        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let vod_id_owned = vod_id.clone();
        let label = format!("downloading chat log for VOD {vod_id}");

        Ok(cancelable_stream(cancel, label, async move {
            download_chat_json(&vod_id_owned, &staging).await?;
            move_file(&staging, &output).await.map_err(WorkerError::from)
        }))
    }
}

async fn download_chat_json(vod_id: &VodId, staging: &std::path::Path) -> WorkerResult<()> {
    which::which("TwitchDownloaderCLI")
        .map_err(|_| WorkerError::MissingInput("TwitchDownloaderCLI binary".to_string()))?;

    let status = Command::new("TwitchDownloaderCLI")
        .args(["chatdownload", "--id", vod_id.as_str(), "--embed-images", "-E", "-o"])
        .arg(staging)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !status.status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr).to_string();
        if stderr.to_lowercase().contains("not found") || stderr.to_lowercase().contains("unavailable") {
            return Err(WorkerError::ChatUnavailable(stderr));
        }
        return Err(WorkerError::ChatToolFailed(format!(
            "TwitchDownloaderCLI chatdownload exited non-zero: {stderr}"
        )));
    }

    if !staging.exists() {
        return Err(WorkerError::ChatToolFailed(
            "chatdownload reported success but produced no output file".to_string(),
        ));
    }

    Ok(())
}
