//! Conversion between `Job`/`Stage` and the flat `jobs` table row, and between
//! `VodMetadata` and the flat `vod_metadata` table row.

use chrono::{DateTime, Utc};
use vodarchive_models::{Channel, Job, Stage, VodId, VodMetadata};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub vod_id: String,
    pub stage: String,
    pub description: String,
    pub vod_file_path: String,
    pub chat_text_file_path: String,
    pub chat_video_file_path: String,
    pub final_video_file_path: String,
    pub uploaded_video_id: String,
    pub leased_by: String,
    pub leased_at_utc: DateTime<Utc>,
    pub failed: bool,
    pub fail_reason: String,
    pub fail_count: i64,
}

impl JobRow {
    pub fn from_job(job: &Job) -> Self {
        Self {
            vod_id: job.vod_id.as_str().to_string(),
            stage: stage_to_str(job.stage).to_string(),
            description: job.description.clone(),
            vod_file_path: job.vod_file_path.clone(),
            chat_text_file_path: job.chat_text_file_path.clone(),
            chat_video_file_path: job.chat_video_file_path.clone(),
            final_video_file_path: job.final_video_file_path.clone(),
            uploaded_video_id: job.uploaded_video_id.clone(),
            leased_by: job.leased_by.clone(),
            leased_at_utc: job.leased_at_utc,
            failed: job.failed,
            fail_reason: job.fail_reason.clone(),
            fail_count: job.fail_count as i64,
        }
    }

    pub fn into_job(self) -> StoreResult<Job> {
        Ok(Job {
            vod_id: VodId::new(self.vod_id),
            stage: stage_from_str(&self.stage)?,
            description: self.description,
            vod_file_path: self.vod_file_path,
            chat_text_file_path: self.chat_text_file_path,
            chat_video_file_path: self.chat_video_file_path,
            final_video_file_path: self.final_video_file_path,
            uploaded_video_id: self.uploaded_video_id,
            leased_by: self.leased_by,
            leased_at_utc: self.leased_at_utc,
            failed: self.failed,
            fail_reason: self.fail_reason,
            fail_count: self.fail_count as u32,
        })
    }
}

pub(crate) fn stage_to_str(stage: Stage) -> &'static str {
    stage.as_str()
}

pub(crate) fn stage_from_str(s: &str) -> StoreResult<Stage> {
    let stage = match s {
        "pending" => Stage::Pending,
        "downloading_vod" => Stage::DownloadingVod,
        "pending_download_chat" => Stage::PendingDownloadChat,
        "downloading_chat" => Stage::DownloadingChat,
        "pending_rendering_chat" => Stage::PendingRenderingChat,
        "rendering_chat" => Stage::RenderingChat,
        "pending_combining" => Stage::PendingCombining,
        "combining" => Stage::Combining,
        "pending_upload" => Stage::PendingUpload,
        "uploading" => Stage::Uploading,
        "uploaded" => Stage::Uploaded,
        other => return Err(StoreError::CorruptRow(format!("unknown stage '{other}'"))),
    };
    Ok(stage)
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct VodMetadataRow {
    pub vod_id: String,
    pub channel_id: String,
    pub channel_display_name: String,
    pub source_url: String,
    pub title: String,
    pub streamed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub moments_json: String,
}

impl VodMetadataRow {
    pub fn from_metadata(metadata: &VodMetadata) -> StoreResult<Self> {
        let moments_json = serde_json::to_string(&metadata.moments)
            .map_err(|e| StoreError::CorruptRow(format!("failed to serialize moments: {e}")))?;

        Ok(Self {
            vod_id: metadata.vod_id.clone(),
            channel_id: metadata.channel.channel_id.clone(),
            channel_display_name: metadata.channel.display_name.clone(),
            source_url: metadata.source_url.clone(),
            title: metadata.title.clone(),
            streamed_at: metadata.streamed_at,
            duration_seconds: metadata.duration_seconds as i64,
            moments_json,
        })
    }

    pub fn into_metadata(self) -> StoreResult<VodMetadata> {
        let moments = serde_json::from_str(&self.moments_json)
            .map_err(|e| StoreError::CorruptRow(format!("corrupt moments_json: {e}")))?;

        Ok(VodMetadata {
            vod_id: self.vod_id,
            channel: Channel {
                channel_id: self.channel_id,
                display_name: self.channel_display_name,
            },
            source_url: self.source_url,
            title: self.title,
            streamed_at: self.streamed_at,
            duration_seconds: self.duration_seconds as u64,
            moments,
        })
    }
}
