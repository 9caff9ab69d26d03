//! Session snapshot types (spec §3 "Session", §6 "Session file format").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregates::{SerializedAttributeMetadata, SerializedLogMetadata, SerializedMetricMetadata, SerializedSpanMetadata};

/// Snapshot format version. Frozen alongside the HLL precision/hash
/// choice (SPEC_FULL.md §3): bumping this is a breaking change to the
/// on-disk layout.
pub const SESSION_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<SerializedMetricMetadata>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spans: Option<Vec<SerializedSpanMetadata>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<SerializedLogMetadata>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<SerializedAttributeMetadata>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub metrics_count: u64,
    pub spans_count: u64,
    pub logs_count: u64,
    pub attributes_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub version: u32,
    pub id: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub signals: Vec<String>,
    pub data: SessionData,
    pub stats: SessionStats,
}

/// Cheap metadata-only projection for `List`/`GetMetadata` (spec §4.8),
/// avoiding a full gunzip+unmarshal of `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub version: u32,
    pub id: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub signals: Vec<String>,
    pub stats: SessionStats,
}

impl From<&Session> for SessionMetadata {
    fn from(session: &Session) -> Self {
        Self {
            version: session.version,
            id: session.id.clone(),
            description: session.description.clone(),
            created: session.created,
            signals: session.signals.clone(),
            stats: session.stats.clone(),
        }
    }
}
