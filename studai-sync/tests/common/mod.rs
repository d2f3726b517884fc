//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use studai_sync::database::{count_words, create_pool, Note, NoteDraft, NoteId, NoteUpdate};
use studai_sync::error::{Result, SyncError};
use studai_sync::remote::NoteApi;
use studai_sync::services::SyncService;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

/// Holds a create call until the test releases it
pub struct Gate {
    pub entered: Notify,
    pub release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Semaphore::new(0),
        })
    }
}

/// In-memory note backend with switchable failures and call counters
#[derive(Default)]
pub struct ScriptedApi {
    notes: Mutex<BTreeMap<i64, Note>>,
    next_id: AtomicI64,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub fail_creates: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub unreachable: AtomicBool,
    gate: Option<Arc<Gate>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn server_notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().values().cloned().collect()
    }

    pub fn server_note(&self, id: i64) -> Option<Note> {
        self.notes.lock().unwrap().get(&id).cloned()
    }

    /// Place a note on the server directly, bypassing the sync layer
    pub fn seed(&self, title: &str, content: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let note = server_note(id, &NoteDraft::new(title, content));
        self.notes.lock().unwrap().insert(id, note);
        id
    }

    pub fn writes(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }

    fn down(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::Generic("connection refused".to_string()));
        }
        Ok(())
    }
}

fn server_note(id: i64, draft: &NoteDraft) -> Note {
    Note {
        id: NoteId::Confirmed(id),
        title: draft.title.clone(),
        content: draft.content.clone(),
        words: count_words(&draft.content),
        created_at: Utc::now(),
        is_shared: false,
        is_pinned: false,
        category: None,
        category_id: draft.category_id,
    }
}

fn server_error(status: u16) -> SyncError {
    SyncError::Api {
        status,
        message: "scripted failure".to_string(),
    }
}

#[async_trait]
impl NoteApi for ScriptedApi {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        self.down()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.server_notes())
    }

    async fn create_note(&self, draft: &NoteDraft) -> Result<Note> {
        self.down()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }

        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(server_error(500));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let note = server_note(id, draft);
        self.notes.lock().unwrap().insert(id, note.clone());
        Ok(note)
    }

    async fn update_note(&self, id: i64, updates: &NoteUpdate) -> Result<Note> {
        self.down()?;
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(server_error(500));
        }

        let mut notes = self.notes.lock().unwrap();
        let note = notes.get_mut(&id).ok_or_else(|| server_error(404))?;
        *note = note.merged(updates);
        Ok(note.clone())
    }

    async fn delete_note(&self, id: i64) -> Result<()> {
        self.down()?;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(server_error(500));
        }

        self.notes
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| server_error(404))
    }

    async fn ping(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }
}

/// Sync service over a fresh on-disk cache
pub async fn create_test_service(api: Arc<ScriptedApi>, online: bool) -> (Arc<SyncService>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let pool = create_pool(&temp_dir.path().join("cache.db")).await.unwrap();

    (Arc::new(SyncService::new(pool, api, online)), temp_dir)
}
