//! Job rows for the VOD archive pipeline: a durable stage machine keyed by `VodId`.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External, stable identifier for a VOD. Supplied by the ingestor, never generated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VodId(pub String);

impl VodId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VodId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Position of a job in the linear pipeline. Variant order is the priority order:
/// the Dispatcher selects the eligible job with the highest-priority stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Pending,
    DownloadingVod,
    PendingDownloadChat,
    DownloadingChat,
    PendingRenderingChat,
    RenderingChat,
    PendingCombining,
    Combining,
    PendingUpload,
    Uploading,
    /// Terminal success stage. `Failed` is tracked out of band on the job, not as a `Stage`.
    Uploaded,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::DownloadingVod => "downloading_vod",
            Stage::PendingDownloadChat => "pending_download_chat",
            Stage::DownloadingChat => "downloading_chat",
            Stage::PendingRenderingChat => "pending_rendering_chat",
            Stage::RenderingChat => "rendering_chat",
            Stage::PendingCombining => "pending_combining",
            Stage::Combining => "combining",
            Stage::PendingUpload => "pending_upload",
            Stage::Uploading => "uploading",
            Stage::Uploaded => "uploaded",
        }
    }

    /// Stage priority used by the Dispatcher's selection query: higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            Stage::Pending => 0,
            Stage::DownloadingVod => 1,
            Stage::PendingDownloadChat => 2,
            Stage::DownloadingChat => 3,
            Stage::PendingRenderingChat => 4,
            Stage::RenderingChat => 5,
            Stage::PendingCombining => 6,
            Stage::Combining => 7,
            Stage::PendingUpload => 8,
            Stage::Uploading => 9,
            Stage::Uploaded => 10,
        }
    }

    /// `Pending*` stages (even priority) are quiescent checkpoints: all artifacts produced
    /// so far are durable and no worker is active.
    pub fn is_checkpoint(&self) -> bool {
        self.priority() % 2 == 0
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Stage::Uploaded)
    }

    /// The active stage a quiescent checkpoint transitions to when the Dispatcher begins it.
    /// `None` for `Uploaded`, which has no active successor.
    pub fn active_form(&self) -> Option<Stage> {
        match self {
            Stage::Pending => Some(Stage::DownloadingVod),
            Stage::PendingDownloadChat => Some(Stage::DownloadingChat),
            Stage::PendingRenderingChat => Some(Stage::RenderingChat),
            Stage::PendingCombining => Some(Stage::Combining),
            Stage::PendingUpload => Some(Stage::Uploading),
            _ => None,
        }
    }

    /// The `Pending*` checkpoint an active stage resumes at after a crash, or transitions to
    /// after its worker's stream drains successfully.
    pub fn checkpoint(&self) -> Stage {
        match self {
            Stage::Pending => Stage::Pending,
            Stage::DownloadingVod => Stage::PendingDownloadChat,
            Stage::PendingDownloadChat => Stage::PendingDownloadChat,
            Stage::DownloadingChat => Stage::PendingRenderingChat,
            Stage::PendingRenderingChat => Stage::PendingRenderingChat,
            Stage::RenderingChat => Stage::PendingCombining,
            Stage::PendingCombining => Stage::PendingCombining,
            Stage::Combining => Stage::PendingUpload,
            Stage::PendingUpload => Stage::PendingUpload,
            Stage::Uploading => Stage::Uploaded,
            Stage::Uploaded => Stage::Uploaded,
        }
    }

    /// `true` for the odd-indexed stages where a worker is (or was) actively producing
    /// the next artifact.
    pub fn is_active(&self) -> bool {
        !self.is_checkpoint()
    }
}

fn default_leased_at() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// One row per VOD, the unit the Dispatcher drives through the stage machine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub vod_id: VodId,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub vod_file_path: String,
    #[serde(default)]
    pub chat_text_file_path: String,
    #[serde(default)]
    pub chat_video_file_path: String,
    #[serde(default)]
    pub final_video_file_path: String,
    #[serde(default)]
    pub uploaded_video_id: String,
    #[serde(default)]
    pub leased_by: String,
    #[serde(default = "default_leased_at")]
    pub leased_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub fail_reason: String,
    #[serde(default)]
    pub fail_count: u32,
}

/// Threshold for consecutive retryable failures after which a job is permanently failed.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

impl Job {
    /// Create a new job in stage `Pending`, as the ingestor does.
    pub fn new(vod_id: impl Into<String>) -> Self {
        Self {
            vod_id: VodId::new(vod_id),
            stage: Stage::Pending,
            description: String::new(),
            vod_file_path: String::new(),
            chat_text_file_path: String::new(),
            chat_video_file_path: String::new(),
            final_video_file_path: String::new(),
            uploaded_video_id: String::new(),
            leased_by: String::new(),
            leased_at_utc: default_leased_at(),
            failed: false,
            fail_reason: String::new(),
            fail_count: 0,
        }
    }

    /// Eligible for selection: not permanently failed and not at the terminal success stage.
    pub fn is_eligible(&self) -> bool {
        !self.failed && !self.stage.is_terminal_success()
    }

    /// Move to the active form of the job's current checkpoint stage.
    pub fn begin_active_stage(mut self) -> Self {
        if let Some(active) = self.stage.active_form() {
            self.stage = active;
        }
        self
    }

    /// Record a status line reported by the active worker.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn record_vod_file(mut self, path: impl Into<String>) -> Self {
        self.vod_file_path = path.into();
        self
    }

    pub fn record_chat_text_file(mut self, path: impl Into<String>) -> Self {
        self.chat_text_file_path = path.into();
        self
    }

    pub fn record_chat_video_file(mut self, path: impl Into<String>) -> Self {
        self.chat_video_file_path = path.into();
        self
    }

    pub fn record_final_video_file(mut self, path: impl Into<String>) -> Self {
        self.final_video_file_path = path.into();
        self
    }

    pub fn record_upload(mut self, uploaded_video_id: impl Into<String>) -> Self {
        self.uploaded_video_id = uploaded_video_id.into();
        self
    }

    /// Advance from an active stage to its successor checkpoint once the worker's stream
    /// has drained and the expected artifact has been recorded.
    pub fn advance_to_checkpoint(mut self) -> Self {
        self.stage = self.stage.checkpoint();
        self
    }

    pub fn lease(mut self, holder: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.leased_by = holder.into();
        self.leased_at_utc = now;
        self
    }

    pub fn refresh_lease(mut self, now: DateTime<Utc>) -> Self {
        self.leased_at_utc = now;
        self
    }

    pub fn release_lease(mut self) -> Self {
        self.leased_by.clear();
        self.leased_at_utc = default_leased_at();
        self
    }

    /// Whether this job's lease looks stale at `now`, for operator diagnostics only. Never
    /// consulted by the Dispatcher's selection logic.
    pub fn lease_is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        !self.leased_by.is_empty() && now - self.leased_at_utc > threshold
    }

    /// Apply the failure policy (§4.6) for an error encountered while driving `self.stage`.
    pub fn record_failure(mut self, message: impl Into<String>, permanent: bool) -> Self {
        self.fail_count += 1;
        self.description = format!("Failed at stage '{:?}': {}", self.stage, message.into());
        if permanent || self.fail_count >= MAX_CONSECUTIVE_FAILURES {
            self.failed = true;
            self.fail_reason = self.description.clone();
        }
        self
    }

    /// Operator reset of a permanently failed job so the Dispatcher will consider it again.
    pub fn reset_failure(mut self, reset_fail_count: bool) -> Self {
        self.failed = false;
        self.fail_reason.clear();
        if reset_fail_count {
            self.fail_count = 0;
        }
        self
    }

    /// Determine whether the job's current position is inconsistent with its recorded
    /// artifacts and, if so, which stage it must roll back to (§4.1).
    pub fn rollback_target(&self) -> Option<Stage> {
        use Stage::*;
        match self.stage {
            PendingRenderingChat | RenderingChat => {
                if self.vod_file_path.is_empty() {
                    Some(Pending)
                } else if self.chat_text_file_path.is_empty() {
                    Some(PendingDownloadChat)
                } else {
                    None
                }
            }
            PendingCombining | Combining => {
                if self.vod_file_path.is_empty() {
                    Some(Pending)
                } else if self.chat_video_file_path.is_empty() {
                    Some(PendingRenderingChat)
                } else {
                    None
                }
            }
            PendingUpload | Uploading => {
                if self.final_video_file_path.is_empty() {
                    Some(PendingCombining)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
