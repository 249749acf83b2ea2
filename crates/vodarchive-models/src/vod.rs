//! Auxiliary, read-only context the pipeline consults but never writes: the source
//! channel a VOD belongs to, and metadata captured at ingestion time.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A source-platform account the ingestor scans for new VODs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Channel {
    /// Platform identifier, e.g. a Twitch login.
    pub channel_id: String,
    pub display_name: String,
}

/// A notable timestamp in the source stream, surfaced by the platform alongside the VOD.
/// Modeled as a tagged variant rather than a flat struct since only `GameChange` carries
/// a payload; everything else the source reports collapses into `Other`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamMoment {
    GameChange { at_seconds: u64, game: String },
    Other,
}

/// Title, URL, and duration captured at ingestion. Read by `VideoUploader` to enrich the
/// upload title/description; never mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VodMetadata {
    pub vod_id: String,
    pub channel: Channel,
    pub source_url: String,
    pub title: String,
    pub streamed_at: DateTime<Utc>,
    pub duration_seconds: u64,
    #[serde(default)]
    pub moments: Vec<StreamMoment>,
}

impl VodMetadata {
    pub fn game_change_moments(&self) -> impl Iterator<Item = (u64, &str)> {
        self.moments.iter().filter_map(|m| match m {
            StreamMoment::GameChange { at_seconds, game } => Some((*at_seconds, game.as_str())),
            StreamMoment::Other => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_change_moments_filters_out_other() {
        let meta = VodMetadata {
            vod_id: "v1".to_string(),
            channel: Channel {
                channel_id: "chan".to_string(),
                display_name: "Chan".to_string(),
            },
            source_url: "https://example.com/v1".to_string(),
            title: "Stream".to_string(),
            streamed_at: Utc::now(),
            duration_seconds: 3600,
            moments: vec![
                StreamMoment::Other,
                StreamMoment::GameChange {
                    at_seconds: 120,
                    game: "Celeste".to_string(),
                },
                StreamMoment::GameChange {
                    at_seconds: 900,
                    game: "Hades".to_string(),
                },
            ],
        };

        let games: Vec<(u64, &str)> = meta.game_change_moments().collect();
        assert_eq!(games, vec![(120, "Celeste"), (900, "Hades")]);
    }
}
