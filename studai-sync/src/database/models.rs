//! Database models
//!
//! Rust structs for the cached entities and the replay log.
//! All models use serde so they can be handed to a UI layer as JSON.

use crate::config::{TEMP_ID_PREFIX, TEMP_ID_RANDOM_LEN};
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identity of a note: assigned by the server, or a placeholder awaiting one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NoteId {
    /// Server-assigned id
    Confirmed(i64),
    /// Client-generated `temp_<millis>_<random>` id
    Pending(String),
}

impl NoteId {
    /// Generate a fresh pending id
    pub fn new_pending() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TEMP_ID_RANDOM_LEN)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();

        NoteId::Pending(format!(
            "{}{}_{}",
            TEMP_ID_PREFIX,
            Utc::now().timestamp_millis(),
            suffix
        ))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, NoteId::Pending(_))
    }

    /// Server id, if the server has assigned one
    pub fn confirmed(&self) -> Option<i64> {
        match self {
            NoteId::Confirmed(id) => Some(*id),
            NoteId::Pending(_) => None,
        }
    }

    /// Key under which the note is stored in the cache
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteId::Confirmed(id) => write!(f, "{}", id),
            NoteId::Pending(temp_id) => f.write_str(temp_id),
        }
    }
}

impl FromStr for NoteId {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(rest) = s.strip_prefix(TEMP_ID_PREFIX) {
            if rest.is_empty() {
                return Err(SyncError::InvalidNoteId(s.to_string()));
            }
            return Ok(NoteId::Pending(s.to_string()));
        }

        s.parse::<i64>()
            .map(NoteId::Confirmed)
            .map_err(|_| SyncError::InvalidNoteId(s.to_string()))
    }
}

impl From<i64> for NoteId {
    fn from(id: i64) -> Self {
        NoteId::Confirmed(id)
    }
}

// Confirmed ids travel as JSON numbers, pending ids as strings.
impl Serialize for NoteId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            NoteId::Confirmed(id) => serializer.serialize_i64(*id),
            NoteId::Pending(temp_id) => serializer.serialize_str(temp_id),
        }
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(id) => Ok(NoteId::Confirmed(id)),
            RawId::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Whitespace-separated token count of note content
pub fn count_words(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}

/// A note as the client knows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub words: i64,
    pub created_at: DateTime<Utc>,
    pub is_shared: bool,
    pub is_pinned: bool,
    pub category: Option<String>,
    pub category_id: Option<i64>,
}

impl Note {
    /// Local stand-in for a note the server has not accepted yet
    pub fn pending(id: NoteId, draft: &NoteDraft) -> Self {
        Self {
            id,
            title: draft.title.clone(),
            words: count_words(&draft.content),
            content: draft.content.clone(),
            created_at: Utc::now(),
            is_shared: false,
            is_pinned: false,
            category: None,
            category_id: draft.category_id,
        }
    }

    /// Copy of this note with `updates` applied over it
    pub fn merged(&self, updates: &NoteUpdate) -> Self {
        let mut note = self.clone();

        if let Some(title) = &updates.title {
            note.title = title.clone();
        }

        if let Some(content) = &updates.content {
            note.words = count_words(content);
            note.content = content.clone();
        }

        if updates.category_id.is_some() {
            note.category_id = updates.category_id;
        }

        note
    }
}

/// Create note request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Update note request; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
}

impl NoteUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// A cached study plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// A mutation waiting to be replayed against the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingOperation {
    Create { temp_id: String, draft: NoteDraft },
    Update { note_id: NoteId, updates: NoteUpdate },
    UpdateTemp { temp_id: String, updates: NoteUpdate },
    Delete { note_id: NoteId },
}

impl PendingOperation {
    /// Stored operation type
    pub fn kind(&self) -> &'static str {
        match self {
            PendingOperation::Create { .. } => "CREATE",
            PendingOperation::Update { .. } => "UPDATE",
            PendingOperation::UpdateTemp { .. } => "UPDATE_TEMP",
            PendingOperation::Delete { .. } => "DELETE",
        }
    }
}

/// A row of the replay log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedOperation {
    /// Replay position; ascending order is replay order
    pub queue_id: i64,
    pub operation: PendingOperation,
    /// Enqueue time, informational only
    pub timestamp: DateTime<Utc>,
}
