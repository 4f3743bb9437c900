//! Append-only history records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Fingerprint;

/// Kind of action recorded in a collection's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// The collection was created.
    Create,
    /// A vector was added.
    Add,
    /// A vector was replaced.
    Update,
    /// A vector was deleted.
    Delete,
    /// Metadata was attached to a vector.
    AddMetadata,
    /// Metadata was overwritten.
    UpdateMetadata,
    /// Metadata was removed.
    DeleteMetadata,
    /// The search-quality parameter changed.
    SetQuality,
}

impl Action {
    /// Lowercase name shown in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::AddMetadata => "add_metadata",
            Self::UpdateMetadata => "update_metadata",
            Self::DeleteMetadata => "delete_metadata",
            Self::SetQuality => "set_quality",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique id of the entry.
    pub id: Uuid,
    /// What happened.
    pub action: Action,
    /// Fingerprint of the vector involved, if any.
    pub fingerprint: Option<Fingerprint>,
    /// Free-text detail.
    pub detail: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Record an action now.
    #[must_use]
    pub fn now(action: Action, fingerprint: Option<Fingerprint>, detail: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), action, fingerprint, detail: detail.into(), timestamp: Utc::now() }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:<15}", self.timestamp.format("%Y-%m-%d %H:%M:%S"), self.action)?;
        match &self.fingerprint {
            Some(fp) => write!(f, " {}", &fp.to_hex()[..16])?,
            None => write!(f, " {:<16}", "-")?,
        }
        write!(f, " {}", self.detail)
    }
}
