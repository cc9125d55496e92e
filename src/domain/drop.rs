use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::track::{TrackCode, TrackRecord};

pub const UNKNOWN_TITLE: &str = "UNKNOWN TRACK";
pub const UNKNOWN_ARTIST: &str = "UNKNOWN ARTIST";
pub const NEUTRAL_COLOR: &str = "#9ca3af";

/// Identifier of a single drop.
///
/// Generated from the wall clock in milliseconds; the ledger bumps it when two
/// drops land in the same millisecond, so ids never repeat within a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DropId(pub String);

impl DropId {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis.to_string())
    }

    /// numeric value of the id, if it was generated by this crate
    pub fn millis(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl Display for DropId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Track metadata copied into a drop at the moment it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackSnapshot {
    pub title: String,
    pub artist: String,
    pub cover_color: String,
}

impl TrackSnapshot {
    pub fn of(track: &TrackRecord) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            cover_color: track.cover_color.clone(),
        }
    }

    /// Fills blank fields of `snapshot` (or all of them, if there is none) with placeholders.
    pub fn or_placeholder(snapshot: Option<TrackSnapshot>) -> Self {
        let snapshot = snapshot.unwrap_or_default();
        Self {
            title: non_blank(snapshot.title, UNKNOWN_TITLE),
            artist: non_blank(snapshot.artist, UNKNOWN_ARTIST),
            cover_color: non_blank(snapshot.cover_color, NEUTRAL_COLOR),
        }
    }
}

fn non_blank(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// One recorded scan. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropEntry {
    pub id: DropId,
    pub track_code: TrackCode,
    pub scanned_at: DateTime<Utc>,
    pub title: String,
    pub artist: String,
    pub cover_color: String,
}

impl DropEntry {
    pub fn new(
        id: DropId,
        track_code: TrackCode,
        scanned_at: DateTime<Utc>,
        snapshot: TrackSnapshot,
    ) -> Self {
        Self {
            id,
            track_code,
            scanned_at,
            title: snapshot.title,
            artist: snapshot.artist,
            cover_color: snapshot.cover_color,
        }
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            title: self.title.clone(),
            artist: self.artist.clone(),
            cover_color: self.cover_color.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_when_no_snapshot() {
        let snapshot = TrackSnapshot::or_placeholder(None);
        assert_eq!(snapshot.title, UNKNOWN_TITLE);
        assert_eq!(snapshot.artist, UNKNOWN_ARTIST);
        assert_eq!(snapshot.cover_color, NEUTRAL_COLOR);
    }

    #[test]
    fn test_placeholder_fills_only_blank_fields() {
        let snapshot = TrackSnapshot::or_placeholder(Some(TrackSnapshot {
            title: "STREET VIBES".to_string(),
            artist: "  ".to_string(),
            cover_color: "#ec4899".to_string(),
        }));
        assert_eq!(snapshot.title, "STREET VIBES");
        assert_eq!(snapshot.artist, UNKNOWN_ARTIST);
        assert_eq!(snapshot.cover_color, "#ec4899");
    }

    #[test]
    fn test_drop_entry_wire_format() -> anyhow::Result<()> {
        let entry = DropEntry::new(
            DropId::from_millis(1_700_000_000_000),
            TrackCode::parse("UNHD-DEMO-001").unwrap(),
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            TrackSnapshot::or_placeholder(None),
        );

        let value = serde_json::to_value(&entry)?;
        assert_eq!(value["id"], "1700000000000");
        assert_eq!(value["trackCode"], "UNHD-DEMO-001");
        assert_eq!(value["coverColor"], NEUTRAL_COLOR);
        assert!(value["scannedAt"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));

        let back: DropEntry = serde_json::from_value(value)?;
        assert_eq!(back, entry);
        Ok(())
    }
}
