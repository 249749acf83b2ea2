#![deny(unreachable_patterns)]
//! yt-dlp/FFmpeg CLI wrapper shared by the stage workers.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A streaming, cancellable FFmpeg runner exposing progress as `Stream<Item = String>`
//! - Source video download via yt-dlp, with idempotent existing-file detection
//! - FFprobe-backed duration/resolution/frame-rate inspection
//! - Cross-device-safe atomic file moves
//! - Hardware encoder selection for the final compositor

pub mod command;
pub mod download;
pub mod encoder;
pub mod error;
pub mod fs_utils;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use download::{download_video, is_supported_url};
pub use encoder::select_encoder;
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use probe::{probe_video, VideoInfo};
