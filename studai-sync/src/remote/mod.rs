//! Remote note API
//!
//! The backend is an external collaborator. The sync layer talks to it
//! through the [`NoteApi`] trait so the coordinator can be driven by the
//! HTTP client in production and by scripted fakes in tests.

pub mod http;

pub use http::HttpNoteApi;

use crate::database::{count_words, Note, NoteDraft, NoteId, NoteUpdate};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// Operations the sync layer needs from the note backend.
///
/// Every id passed in is a server id; pending ids never reach this trait.
#[async_trait]
pub trait NoteApi: Send + Sync {
    /// Every note of the authenticated user
    async fn list_notes(&self) -> Result<Vec<Note>>;

    /// Create a note, returning the server's copy with its assigned id
    async fn create_note(&self, draft: &NoteDraft) -> Result<Note>;

    /// Apply a partial update
    async fn update_note(&self, id: i64, updates: &NoteUpdate) -> Result<Note>;

    async fn delete_note(&self, id: i64) -> Result<()>;

    /// Whether the backend answers at all
    async fn ping(&self) -> bool;
}

/// Note as the backend serializes it
#[derive(Debug, Clone, Deserialize)]
pub struct ServerNote {
    #[serde(default)]
    pub note_id: Option<NoteId>,
    #[serde(default)]
    pub id: Option<NoteId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub words: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at_camel: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_shared: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_pinned: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

/// `GET /notes` response body
#[derive(Debug, Deserialize)]
pub struct NotesEnvelope {
    #[serde(default)]
    pub notes: Vec<ServerNote>,
}

/// `POST /notes/create` and `PUT /notes/:id` response body
#[derive(Debug, Deserialize)]
pub struct NoteEnvelope {
    pub note: ServerNote,
}

impl TryFrom<ServerNote> for Note {
    type Error = SyncError;

    fn try_from(server: ServerNote) -> Result<Self> {
        let id = match server.note_id.or(server.id) {
            Some(NoteId::Confirmed(id)) => NoteId::Confirmed(id),
            Some(other) => return Err(SyncError::InvalidNoteId(other.key())),
            None => return Err(SyncError::InvalidNoteId("missing".to_string())),
        };

        let content = server.content.unwrap_or_default();
        let created_at = server
            .created_at
            .or(server.created_at_camel)
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(Note {
            id,
            title: server.title.unwrap_or_default(),
            words: server.words.unwrap_or_else(|| count_words(&content)),
            content,
            created_at,
            is_shared: server.is_shared,
            is_pinned: server.is_pinned,
            category: server.category,
            category_id: server.category_id,
        })
    }
}

/// Accepts RFC 3339 as well as the naive `YYYY-MM-DD HH:MM:SS` form SQL backends emit
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Backends disagree on booleans; accept `true`, `1`, and `null`
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawBool {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<RawBool>::deserialize(deserializer)? {
        Some(RawBool::Bool(value)) => value,
        Some(RawBool::Int(value)) => value != 0,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn parse(json: &str) -> Result<Note> {
        let server: ServerNote = serde_json::from_str(json)?;
        Note::try_from(server)
    }

    #[test]
    fn test_maps_snake_case_server_note() {
        let note = parse(
            r#"{
                "note_id": 12,
                "title": "Photosynthesis",
                "content": "light to sugar",
                "created_at": "2024-03-01T10:15:00Z",
                "is_shared": true,
                "is_pinned": 0,
                "category": "Biology",
                "category_id": 4
            }"#,
        )
        .unwrap();

        assert_eq!(note.id, NoteId::Confirmed(12));
        assert_eq!(note.words, 3);
        assert!(note.is_shared);
        assert!(!note.is_pinned);
        assert_eq!(note.category.as_deref(), Some("Biology"));
        assert_eq!(note.category_id, Some(4));
        assert_eq!(note.created_at.month(), 3);
    }

    #[test]
    fn test_maps_id_and_camel_case_timestamp() {
        let note = parse(
            r#"{"id": "31", "title": "T", "words": 99, "createdAt": "2024-05-06 07:08:09"}"#,
        )
        .unwrap();

        assert_eq!(note.id, NoteId::Confirmed(31));
        assert_eq!(note.words, 99);
        assert_eq!(note.content, "");
        assert_eq!(note.created_at.hour(), 7);
    }

    #[test]
    fn test_rejects_missing_or_temp_id() {
        assert!(parse(r#"{"title": "no id"}"#).is_err());
        assert!(parse(r#"{"id": "temp_1_abc"}"#).is_err());
    }
}
