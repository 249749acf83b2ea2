//! Hardware encoder selection for the final compositor.

use std::process::Stdio;
use std::sync::OnceLock;

use tokio::process::Command;
use tracing::{debug, warn};

/// Preference order: AMD, then NVIDIA, then Intel, falling back to the software encoder.
const ENCODER_PREFERENCE: &[&str] = &["h264_amf", "h264_nvenc", "h264_qsv", "libx264"];

static SELECTED_ENCODER: OnceLock<String> = OnceLock::new();

/// Probe `ffmpeg -encoders` and pick the first available encoder from the preference
/// list. The result is cached for the lifetime of the process since the set of
/// available hardware encoders cannot change while running.
pub async fn select_encoder() -> &'static str {
    if let Some(cached) = SELECTED_ENCODER.get() {
        return cached;
    }

    let available = list_available_encoders().await;
    let chosen = ENCODER_PREFERENCE
        .iter()
        .find(|candidate| available.iter().any(|line| line.contains(*candidate)))
        .copied()
        .unwrap_or("libx264");

    debug!("selected encoder: {chosen}");
    SELECTED_ENCODER.get_or_init(|| chosen.to_string())
}

async fn list_available_encoders() -> Vec<String> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect(),
        Ok(output) => {
            warn!(
                "ffmpeg -encoders exited non-zero, falling back to software encoding: {}",
                output.status
            );
            Vec::new()
        }
        Err(err) => {
            warn!("failed to run ffmpeg -encoders, falling back to software encoding: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_order_is_amd_nvidia_intel_software() {
        assert_eq!(
            ENCODER_PREFERENCE,
            &["h264_amf", "h264_nvenc", "h264_qsv", "libx264"]
        );
    }
}
