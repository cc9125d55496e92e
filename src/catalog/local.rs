use std::{collections::HashMap, path::Path};

use anyhow::Context;

use crate::domain::track::{TrackCode, TrackRecord};

const DEMO_TRACKS: &[(&str, &str, &str, &str, &str)] = &[
    (
        "UNHD-DEMO-001",
        "ROOFTOP CYPHER (DEMO)",
        "UNHEARD CREW",
        "#f97316",
        "https://actions.google.com/sounds/v1/alarms/bugle_tune.ogg",
    ),
    (
        "UNHD-DEMO-002",
        "SUBWAY REVERB TAPE",
        "MIDNIGHT LINE",
        "#22c55e",
        "https://actions.google.com/sounds/v1/alarms/digital_watch_alarm_long.ogg",
    ),
    (
        "UNHD-DEMO-003",
        "MIDNIGHT FREESTYLE",
        "SHADOW MC",
        "#8b5cf6",
        "https://actions.google.com/sounds/v1/cartoon/slide_whistle.ogg",
    ),
    (
        "UNHD-DEMO-004",
        "STREET VIBES",
        "URBAN COLLECTIVE",
        "#ec4899",
        "https://actions.google.com/sounds/v1/foley/swoosh.ogg",
    ),
    (
        "UNHD-DEMO-005",
        "UNDERGROUND ANTHEM",
        "THE BASEMENT",
        "#06b6d4",
        "https://actions.google.com/sounds/v1/cartoon/pop.ogg",
    ),
];

/// In-memory catalog, consulted before the remote one.
#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    tracks: HashMap<TrackCode, TrackRecord>,
}

impl LocalCatalog {
    /// catalog with the demo tracks shipped with the app
    pub fn demo() -> Self {
        Self::from_records(DEMO_TRACKS.iter().filter_map(
            |(code, title, artist, cover_color, audio_url)| {
                Some(TrackRecord {
                    code: TrackCode::parse(code)?,
                    title: title.to_string(),
                    artist: artist.to_string(),
                    cover_color: cover_color.to_string(),
                    audio_url: audio_url.to_string(),
                })
            },
        ))
    }

    pub fn from_records(records: impl IntoIterator<Item = TrackRecord>) -> Self {
        Self {
            tracks: records
                .into_iter()
                .map(|record| (record.code.clone(), record))
                .collect(),
        }
    }

    /// reads a JSON array of track records, in the format served by `GET /tracks`
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tracks file {}", path.to_string_lossy()))?;
        let records: Vec<TrackRecord> =
            serde_json::from_str(&contents).with_context(|| "Failed to parse tracks JSON")?;
        Ok(Self::from_records(records))
    }

    pub fn get(&self, code: &TrackCode) -> Option<&TrackRecord> {
        self.tracks.get(code)
    }

    /// all tracks, ordered by code
    pub fn list(&self) -> Vec<TrackRecord> {
        let mut tracks: Vec<_> = self.tracks.values().cloned().collect();
        tracks.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
