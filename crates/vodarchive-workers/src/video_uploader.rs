//! Uploads the composited final video to the public video-hosting service and records
//! the remote id on the job (the one worker with a side effect outside its own stream).

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vodarchive_models::{sanitize_title, VodMetadata};
use vodarchive_store::JobStore;

use crate::{cancelable_stream, StageWorker, StatusStream, WorkerError, WorkerResult};

const UPLOAD_ENDPOINT: &str = "https://upload.videos.example.com/v1/videos";

/// Remote video created by a successful upload.
#[derive(Debug, Clone)]
pub struct UploadedVideo {
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

pub struct VideoUploader {
    store: JobStore,
    final_mp4_path: PathBuf,
    metadata: VodMetadata,
    oauth_token: String,
    client: reqwest::Client,
}

impl VideoUploader {
    pub fn new(
        store: JobStore,
        final_mp4_path: impl Into<PathBuf>,
        metadata: VodMetadata,
        oauth_token: impl Into<String>,
    ) -> Self {
        Self {
            store,
            final_mp4_path: final_mp4_path.into(),
            metadata,
            oauth_token: oauth_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn description(&self) -> String {
        let mut body = format!(
            "Archived from {}\nChannel: {}\nStreamed: {}\n",
            self.metadata.source_url,
            self.metadata.channel.display_name,
            self.metadata.streamed_at.format("%Y-%m-%d"),
        );

        let moments: Vec<String> = self
            .metadata
            .game_change_moments()
            .map(|(at_seconds, game)| {
                format!("- {:02}:{:02}:{:02} {game}", at_seconds / 3600, (at_seconds / 60) % 60, at_seconds % 60)
            })
            .collect();

        if !moments.is_empty() {
            body.push_str("\nGames played:\n");
            body.push_str(&moments.join("\n"));
        }

        body
    }

    fn tags(&self) -> Vec<String> {
        vec![self.metadata.channel.channel_id.clone(), "vod-archive".to_string()]
    }
}

#[async_trait]
impl StageWorker for VideoUploader {
    fn name(&self) -> &'static str {
        "video_uploader"
    }

    /// The uploader has no local output file; its artifact is a remote id. Returning an
    /// empty path signals "no local path" rather than a bogus on-disk location.
    fn output_path(&self, _vod_id: &vodarchive_models::VodId) -> PathBuf {
        PathBuf::new()
    }

    async fn run(
        &self,
        vod_id: &vodarchive_models::VodId,
        cancel: CancellationToken,
    ) -> WorkerResult<StatusStream> {
        if self.oauth_token.is_empty() {
            return Err(WorkerError::MissingInput("oauth_token".to_string()));
        }
        if self.final_mp4_path.as_os_str().is_empty() || !self.final_mp4_path.exists() {
            return Err(WorkerError::MissingInput("final_mp4".to_string()));
        }

        let client = self.client.clone();
        let token = self.oauth_token.clone();
        let path = self.final_mp4_path.clone();
        let title = sanitize_title(&self.metadata.title);
        let description = self.description();
        let tags = self.tags();
        let store = self.store.clone();
        let vod_id_owned = vod_id.clone();
        let label = format!("uploading VOD {vod_id} to video host");

        Ok(cancelable_stream(cancel, label, async move {
            let uploaded = upload_final_video(&client, &token, &path, &title, &description, &tags).await?;
            // Side effect outside the sequence (§4.3): written directly rather than
            // through the Dispatcher's usual "record artifact" step, since there is no
            // local artifact path for a remote upload.
            store.record_upload(&vod_id_owned, &uploaded.video_id).await?;
            info!(vod_id = %vod_id_owned, video_id = %uploaded.video_id, "upload complete");
            Ok(())
        }))
    }
}

/// Multipart upload to the hosting API's OAuth-protected endpoint. Category, privacy,
/// and MadeForKids are fixed defaults (§6): gaming, private, false.
async fn upload_final_video(
    client: &reqwest::Client,
    oauth_token: &str,
    path: &std::path::Path,
    title: &str,
    description: &str,
    tags: &[String],
) -> WorkerResult<UploadedVideo> {
    let file_bytes = tokio::fs::read(path).await?;
    let file_part = multipart::Part::bytes(file_bytes)
        .file_name(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video.mp4".to_string()),
        )
        .mime_str("video/mp4")
        .map_err(|err| WorkerError::UploadRejected(err.to_string()))?;

    let form = multipart::Form::new()
        .text("title", title.to_string())
        .text("description", description.to_string())
        .text("category", "gaming")
        .text("privacy", "private")
        .text("made_for_kids", "false")
        .text("tags", tags.join(","))
        .part("file", file_part);

    let response = client
        .post(UPLOAD_ENDPOINT)
        .bearer_auth(oauth_token)
        .multipart(form)
        .send()
        .await
        .map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                WorkerError::UploadFailed(format!("transient upload failure: {err}"))
            } else {
                WorkerError::UploadRejected(err.to_string())
            }
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(WorkerError::UploadRejected(format!(
            "upload rejected with {status}: credentials invalid or expired"
        )));
    }
    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(WorkerError::UploadFailed(format!(
            "upload host returned {status}: {body}"
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(WorkerError::UploadRejected(format!(
            "upload host returned {status}: {body}"
        )));
    }

    let parsed: UploadResponse = response
        .json()
        .await
        .map_err(|err| WorkerError::UploadRejected(format!("malformed upload response: {err}")))?;

    Ok(UploadedVideo { video_id: parsed.id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodarchive_models::{Channel, StreamMoment};

    fn sample_metadata() -> VodMetadata {
        VodMetadata {
            vod_id: "v1".to_string(),
            channel: Channel {
                channel_id: "some_streamer".to_string(),
                display_name: "Some Streamer".to_string(),
            },
            source_url: "https://twitch.tv/videos/123".to_string(),
            title: "  Epic   <Stream> \u{1F3AE}  ".to_string(),
            streamed_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            duration_seconds: 7200,
            moments: vec![
                StreamMoment::Other,
                StreamMoment::GameChange {
                    at_seconds: 125,
                    game: "Celeste".to_string(),
                },
            ],
        }
    }

    async fn in_memory_store() -> JobStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("../vodarchive-store/migrations").run(&pool).await.unwrap();
        JobStore::from_pool(pool)
    }

    #[tokio::test]
    async fn description_lists_game_changes() {
        let uploader = VideoUploader::new(in_memory_store().await, "/tmp/final.mp4", sample_metadata(), "token");
        let description = uploader.description();
        assert!(description.contains("Celeste"));
        assert!(description.contains("00:02:05"));
        assert!(description.contains("https://twitch.tv/videos/123"));
    }

    #[tokio::test]
    async fn tags_include_channel_id() {
        let uploader = VideoUploader::new(in_memory_store().await, "/tmp/final.mp4", sample_metadata(), "token");
        assert!(uploader.tags().contains(&"some_streamer".to_string()));
    }

    #[tokio::test]
    async fn run_rejects_missing_oauth_token() {
        let uploader = VideoUploader::new(in_memory_store().await, "/tmp/final.mp4", sample_metadata(), "");
        let err = uploader
            .run(&vodarchive_models::VodId::new("v1"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::MissingInput(_)));
    }
}
