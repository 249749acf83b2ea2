//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Whether this error is structurally impossible to succeed on retry.
    pub fn is_permanent(&self) -> bool {
        match self {
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::YtDlpNotFound
            | MediaError::InvalidVideo(_) => true,
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref().is_some_and(is_permanent_stderr)
            }
            MediaError::DownloadFailed { message } => is_permanent_stderr(message),
            MediaError::Cancelled
            | MediaError::Timeout(_)
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::FileNotFound(_) => false,
        }
    }
}

/// Message-substring heuristic shared with the workers crate's failure classification:
/// the source video is age-restricted/private/unavailable/deleted/region-blocked, which
/// retrying cannot fix.
fn is_permanent_stderr(text: &str) -> bool {
    let msg = text.to_lowercase();

    if msg.contains("age") && (msg.contains("restrict") || msg.contains("verif")) {
        return true;
    }
    if msg.contains("private video") || msg.contains("video is private") {
        return true;
    }
    if msg.contains("video unavailable")
        || msg.contains("video is unavailable")
        || msg.contains("video not available")
    {
        return true;
    }
    if msg.contains("video has been removed") || msg.contains("video was deleted") {
        return true;
    }
    if msg.contains("not available in your country") || msg.contains("blocked in your country") {
        return true;
    }
    if msg.contains("live stream") || msg.contains("live event") {
        return true;
    }

    false
}
