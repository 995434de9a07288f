//! Submission model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// The opaque form payload: field name to value, produced by the form
/// collaborator. Never interpreted by this core.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A unique identifier for a submission, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Create a new unique submission ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The form type a submission belongs to. Determines which remote endpoint
/// it routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Household health survey
    Health,
    /// Water-quality sample
    Water,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Water => "water",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "health" => Ok(Self::Health),
            "water" => Ok(Self::Water),
            other => Err(Error::InvalidInput(format!(
                "unknown submission category: {other}"
            ))),
        }
    }
}

/// Delivery state of a submission.
///
/// `Failed` is transient and retry-eligible, not terminal: the sync engine
/// picks failed entries up again on the next trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Saved locally, not yet confirmed received by the remote endpoint
    Pending,
    /// Acknowledged by the remote endpoint; never re-sent
    Synced,
    /// Last send attempt failed; retried on the next trigger
    Failed,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown sync state: {other}"
            ))),
        }
    }
}

/// One form payload plus its sync metadata: the unit of work for this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Unique identifier, stable for the lifetime of the record
    pub id: SubmissionId,
    /// Opaque form payload
    pub payload: Payload,
    /// Form type, determines remote endpoint routing
    pub category: Category,
    /// Creation timestamp (Unix ms), set at append time, immutable
    pub created_at: i64,
    /// Delivery state
    pub sync_state: SyncState,
    /// Timestamp of the most recent send attempt (Unix ms)
    pub last_attempt_at: Option<i64>,
    /// Incremented on every send attempt
    pub attempt_count: u32,
}

impl Submission {
    /// Create a new pending submission with the given payload and category
    #[must_use]
    pub fn new(payload: Payload, category: Category) -> Self {
        Self {
            id: SubmissionId::new(),
            payload,
            category,
            created_at: chrono::Utc::now().timestamp_millis(),
            sync_state: SyncState::Pending,
            last_attempt_at: None,
            attempt_count: 0,
        }
    }

    /// Whether the remote endpoint has acknowledged this submission
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        matches!(self.sync_state, SyncState::Synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_payload() -> Payload {
        let mut payload = Payload::new();
        payload.insert("houseId".to_string(), "H1".into());
        payload.insert("age".to_string(), "34".into());
        payload
    }

    #[test]
    fn test_submission_id_unique() {
        let id1 = SubmissionId::new();
        let id2 = SubmissionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_submission_id_parse() {
        let id = SubmissionId::new();
        let parsed: SubmissionId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_category_round_trip() {
        assert_eq!("health".parse::<Category>().unwrap(), Category::Health);
        assert_eq!(" Water ".parse::<Category>().unwrap(), Category::Water);
        assert_eq!(Category::Health.as_str(), "health");
        assert!("soil".parse::<Category>().is_err());
    }

    #[test]
    fn test_sync_state_round_trip() {
        for state in [SyncState::Pending, SyncState::Synced, SyncState::Failed] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("done".parse::<SyncState>().is_err());
    }

    #[test]
    fn test_submission_new_defaults() {
        let submission = Submission::new(sample_payload(), Category::Health);
        assert_eq!(submission.sync_state, SyncState::Pending);
        assert_eq!(submission.attempt_count, 0);
        assert_eq!(submission.last_attempt_at, None);
        assert!(submission.created_at > 0);
        assert!(!submission.is_synced());
        assert_eq!(submission.payload["houseId"], "H1");
    }

    #[test]
    fn test_category_serializes_lowercase() {
        let json = serde_json::to_string(&Category::Water).unwrap();
        assert_eq!(json, "\"water\"");
    }
}
