//! Alert and chunk records.
//!
//! An [`Alert`] is one logical recording session; each uploaded segment of it
//! is a [`Chunk`]. Both are owned by the metadata store, which assigns ids and
//! timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque alert identifier assigned by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    /// Wrap an existing id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an existing user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an alert.
///
/// Transitions only go forward: `Recording` to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Segments are still being captured.
    Recording,
    /// The session was stopped.
    Completed,
}

impl AlertStatus {
    /// Whether moving from `self` to `next` keeps the status monotonic.
    #[must_use]
    pub fn can_become(self, next: Self) -> bool {
        !(self == Self::Completed && next == Self::Recording)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recording => write!(f, "recording"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recording" => Ok(Self::Recording),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

/// A persisted alert record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Store-assigned identifier.
    pub id: AlertId,
    /// User who started the recording.
    pub owner: UserId,
    /// Current lifecycle status.
    pub status: AlertStatus,
    /// When the store created the record.
    pub started_at: DateTime<Utc>,
    /// When the record was marked completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Check if the alert is still recording.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.status == AlertStatus::Recording
    }
}

/// Fields of an alert that may be updated after creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertUpdate {
    /// New status, if changing.
    pub status: Option<AlertStatus>,
}

impl AlertUpdate {
    /// The update applied when a session stops.
    #[must_use]
    pub fn completed() -> Self {
        Self {
            status: Some(AlertStatus::Completed),
        }
    }
}

/// Chunk metadata submitted by the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChunk {
    /// Position of the chunk within its alert, in upload order.
    pub sequence_index: u32,
    /// Key the payload was stored under.
    pub remote_key: String,
    /// Size of the stored payload.
    pub size_bytes: u64,
    /// BLAKE3 hash of the stored payload.
    pub content_hash: String,
    /// Content type sent with the payload.
    pub content_type: String,
}

impl NewChunk {
    /// Describe a payload about to be recorded under `remote_key`.
    #[must_use]
    pub fn for_payload(
        sequence_index: u32,
        remote_key: String,
        payload: &[u8],
        content_type: &str,
    ) -> Self {
        Self {
            sequence_index,
            remote_key,
            size_bytes: payload.len() as u64,
            content_hash: blake3::hash(payload).to_hex().to_string(),
            content_type: content_type.to_string(),
        }
    }
}

/// A persisted chunk record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Alert that owns this chunk.
    pub alert_id: AlertId,
    /// Position of the chunk within its alert, in upload order.
    pub sequence_index: u32,
    /// Key the payload was stored under.
    pub remote_key: String,
    /// Size of the stored payload.
    pub size_bytes: u64,
    /// BLAKE3 hash of the stored payload.
    pub content_hash: String,
    /// Content type sent with the payload.
    pub content_type: String,
    /// Store-assigned upload time.
    pub uploaded_at: DateTime<Utc>,
}

/// Build the remote key for a chunk.
///
/// Layout: `{prefix}/{owner}/{alert}/{sequence}_{timestamp_ms}.{ext}`.
#[must_use]
pub fn remote_key(
    prefix: &str,
    owner: &UserId,
    alert_id: &AlertId,
    sequence_index: u32,
    timestamp: DateTime<Utc>,
    extension: &str,
) -> String {
    format!(
        "{}/{owner}/{alert_id}/{sequence_index}_{}.{extension}",
        prefix.trim_matches('/'),
        timestamp.timestamp_millis(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_alert_status_display_and_parse() {
        assert_eq!(AlertStatus::Recording.to_string(), "recording");
        assert_eq!(AlertStatus::Completed.to_string(), "completed");
        assert_eq!("completed".parse::<AlertStatus>(), Ok(AlertStatus::Completed));
        assert!("paused".parse::<AlertStatus>().is_err());
    }

    #[test]
    fn test_alert_status_is_monotonic() {
        assert!(AlertStatus::Recording.can_become(AlertStatus::Completed));
        assert!(AlertStatus::Completed.can_become(AlertStatus::Completed));
        assert!(!AlertStatus::Completed.can_become(AlertStatus::Recording));
    }

    #[test]
    fn test_remote_key_layout() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let key = remote_key(
            "alerts",
            &UserId::new("user-1"),
            &AlertId::new("a1b2"),
            7,
            at,
            "m4a",
        );
        assert_eq!(key, "alerts/user-1/a1b2/7_1700000000123.m4a");
    }

    #[test]
    fn test_remote_key_trims_prefix_slashes() {
        let at = Utc.timestamp_millis_opt(5).unwrap();
        let key = remote_key("/alerts/", &UserId::new("u"), &AlertId::new("a"), 0, at, "m4a");
        assert_eq!(key, "alerts/u/a/0_5.m4a");
    }

    #[test]
    fn test_new_chunk_for_payload() {
        let chunk = NewChunk::for_payload(2, "k".to_string(), b"audio", "audio/m4a");
        assert_eq!(chunk.size_bytes, 5);
        assert_eq!(chunk.content_hash, blake3::hash(b"audio").to_hex().to_string());
        assert_eq!(chunk.content_type, "audio/m4a");
    }

    #[test]
    fn test_alert_serialization() {
        let alert = Alert {
            id: AlertId::new("abc"),
            owner: UserId::new("u1"),
            status: AlertStatus::Recording,
            started_at: Utc::now(),
            completed_at: None,
        };

        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"status\":\"recording\""));
        assert!(!json.contains("completed_at"));

        let back: Alert = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alert);
        assert!(back.is_recording());
    }

    #[test]
    fn test_alert_update_completed() {
        assert_eq!(
            AlertUpdate::completed().status,
            Some(AlertStatus::Completed)
        );
        assert_eq!(AlertUpdate::default().status, None);
    }
}
