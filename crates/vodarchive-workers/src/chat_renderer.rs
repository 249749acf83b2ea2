//! Renders a chat overlay video from the downloaded chat log with
//! `TwitchDownloaderCLI chatrender`, `chats/{vod_id}_chat.mp4`.
//!
//! Frame rate and height are taken from the source VOD so the overlay lines up with it
//! frame-for-frame once composited by [`crate::FinalRenderer`].

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use vodarchive_media::{move_file, probe_video};
use vodarchive_models::VodId;

use crate::{cancelable_stream, StageWorker, StatusStream, WorkerError, WorkerResult};

pub struct ChatRenderer {
    base_dir: PathBuf,
    chat_json_path: PathBuf,
    vod_mp4_path: PathBuf,
}

impl ChatRenderer {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        chat_json_path: impl Into<PathBuf>,
        vod_mp4_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            chat_json_path: chat_json_path.into(),
            vod_mp4_path: vod_mp4_path.into(),
        }
    }
}

#[async_trait]
impl StageWorker for ChatRenderer {
    fn name(&self) -> &'static str {
        "chat_renderer"
    }

    fn output_path(&self, vod_id: &VodId) -> PathBuf {
        self.base_dir.join("chats").join(format!("{}_chat.mp4", vod_id))
    }

    async fn run(&self, vod_id: &VodId, cancel: CancellationToken) -> WorkerResult<StatusStream> {
        if self.chat_json_path.as_os_str().is_empty() || !self.chat_json_path.exists() {
            return Err(WorkerError::MissingInput("chat_json".to_string()));
        }
        if self.vod_mp4_path.as_os_str().is_empty() || !self.vod_mp4_path.exists() {
            return Err(WorkerError::MissingInput("vod_mp4".to_string()));
        }

        let output = self.output_path(vod_id);
        // TwitchDownloaderCLI writes here while rendering (§6); only moved into `output`
        // once the render finishes cleanly.
        let staging = self.base_dir.join("staging").join("chats").join(format!("{}_chat.mp4", vod_id));
        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let chat_json = self.chat_json_path.clone();
        let vod_mp4 = self.vod_mp4_path.clone();
        let label = format!("rendering chat overlay for VOD {vod_id}");

        Ok(cancelable_stream(cancel, label, async move {
            render_chat_video(&chat_json, &vod_mp4, &staging).await?;
            move_file(&staging, &output).await.map_err(WorkerError::from)
        }))
    }
}

async fn render_chat_video(
    chat_json: &std::path::Path,
    vod_mp4: &std::path::Path,
    staging: &std::path::Path,
) -> WorkerResult<()> {
    which::which("TwitchDownloaderCLI")
        .map_err(|_| WorkerError::MissingInput("TwitchDownloaderCLI binary".to_string()))?;

    let source_info = probe_video(vod_mp4).await?;

    let status = Command::new("TwitchDownloaderCLI")
        .args([
            "chatrender",
            "-i",
            &chat_json.to_string_lossy(),
            "--framerate",
            &format!("{:.0}", source_info.fps),
            "--height",
            &source_info.height.to_string(),
            "--background-color",
            "#00000000",
            "-o",
        ])
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
            "TwitchDownloaderCLI chatrender exited non-zero: {stderr}"
        )));
    }

    Ok(())
}
