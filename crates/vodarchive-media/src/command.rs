//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr, parsed line by line by the runner.
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Parsed state of an in-progress FFmpeg run, accumulated from `-progress pipe:2` lines.
#[derive(Debug, Clone, Default)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    pub out_time_ms: i64,
    pub out_time: String,
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Render as the single human-readable status line the stage worker contract expects.
    pub fn to_status_line(&self) -> String {
        format!(
            "frame={} fps={:.1} time={} speed={:.2}x",
            self.frame, self.fps, self.out_time, self.speed
        )
    }
}

/// Runs FFmpeg under a cancellation token, exposing progress as a lazy stream of
/// human-readable status strings rather than a callback.
pub struct FfmpegRunner {
    cancel: CancellationToken,
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner bound to the given cancellation token.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            timeout_secs: None,
        }
    }

    /// Set an overall timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command, returning a finite, non-restartable stream of status lines.
    /// The stream's final item is `Err` if the run failed or was cancelled; otherwise the
    /// stream simply ends once FFmpeg exits successfully.
    pub async fn run(
        &self,
        cmd: &FfmpegCommand,
    ) -> MediaResult<impl Stream<Item = MediaResult<String>>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("running ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr).lines();

        let (tx, rx) = mpsc::channel(64);
        let cancel = self.cancel.clone();
        let timeout_secs = self.timeout_secs;

        tokio::spawn(async move {
            let mut current = FfmpegProgress::default();

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        warn!("ffmpeg run cancelled, killing process");
                        let _ = child.kill().await;
                        let _ = tx.send(Err(MediaError::Cancelled)).await;
                        return;
                    }

                    line = reader.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if parse_progress_line(&line, &mut current) {
                                    let _ = tx.send(Ok(current.to_status_line())).await;
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                let _ = tx.send(Err(MediaError::Io(err))).await;
                                return;
                            }
                        }
                    }
                }
            }

            let wait = child.wait();
            let status = match timeout_secs {
                Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), wait).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("ffmpeg timed out after {secs} seconds, killing process");
                        let _ = child.kill().await;
                        let _ = tx.send(Err(MediaError::Timeout(secs))).await;
                        return;
                    }
                },
                None => wait.await,
            };

            match status {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let _ = tx
                        .send(Err(MediaError::ffmpeg_failed(
                            "ffmpeg exited with non-zero status",
                            None,
                            status.code(),
                        )))
                        .await;
                }
                Err(err) => {
                    let _ = tx.send(Err(MediaError::Io(err))).await;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

/// Parse one `-progress pipe:2` line, updating `current` in place. Returns `true` when the
/// line marks a reportable snapshot (FFmpeg emits `progress=continue`/`progress=end` once
/// per block of key=value lines).
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> bool {
    let line = line.trim();

    let Some((key, value)) = line.split_once('=') else {
        return false;
    };

    match key {
        "out_time_ms" | "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = if key == "out_time_us" { us / 1000 } else { us };
            }
        }
        "out_time" => current.out_time = value.to_string(),
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if value != "N/A" {
                if let Some(speed_str) = value.strip_suffix('x') {
                    if let Ok(speed) = speed_str.parse() {
                        current.speed = speed;
                    }
                }
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return true;
        }
        _ => {}
    }

    false
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Check if yt-dlp is available.
pub fn check_ytdlp() -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .video_codec("libx264")
            .crf(18);

        let args = cmd.build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        parse_progress_line("out_time_ms=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let reportable = parse_progress_line("progress=end", &mut progress);
        assert!(reportable);
        assert!(progress.is_complete);
    }

    #[test]
    fn status_line_is_human_readable() {
        let progress = FfmpegProgress {
            frame: 120,
            fps: 29.97,
            out_time_ms: 4_000,
            out_time: "00:00:04.000000".to_string(),
            speed: 1.2,
            is_complete: false,
        };
        let line = progress.to_status_line();
        assert!(line.contains("frame=120"));
        assert!(line.contains("speed=1.20x"));
    }
}
