use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Identifier printed on a tag, e.g. `UNHD-DEMO-001`.
///
/// Always trimmed and never empty. Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackCode(String);

impl TrackCode {
    /// returns `None` if the code is blank after trimming
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TrackCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("blank track code {value:?}"))
    }
}

impl From<TrackCode> for String {
    fn from(code: TrackCode) -> Self {
        code.0
    }
}

impl Display for TrackCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog entry, as served by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub code: TrackCode,
    pub title: String,
    pub artist: String,
    pub cover_color: String,
    pub audio_url: String,
}
