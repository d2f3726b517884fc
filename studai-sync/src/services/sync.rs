//! Sync service
//!
//! Single entry point for note mutations. Writes go straight to the server
//! when it is reachable and fall back to cache + queue when it is not, so a
//! caller always gets a usable note back. `sync_to_server` drains the queue
//! once connectivity returns, turning temp ids into server ids as their
//! creates replay, and finally lets the server overwrite the cache.

use crate::config::RESOLUTION_RETENTION_DAYS;
use crate::database::{Note, NoteDraft, NoteId, NoteUpdate, PendingOperation, QueuedOperation};
use crate::error::{Result, SyncError};
use crate::remote::NoteApi;
use crate::storage::{CacheStore, OperationQueue};
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a note mutation was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Confirmed by the server
    Synced,
    /// Applied locally and queued for replay
    Queued,
    /// Applied locally; the note has no server id yet, so the change waits on its create
    QueuedAwaitingCreate,
    /// The note never reached the server and was dropped locally along with its queued create
    DiscardedLocally,
}

/// Result of `add_note`, `update_note`, and `delete_note`
#[derive(Debug, Clone, Serialize)]
pub struct NoteWrite {
    /// Best known copy of the note after the write, if it still exists
    pub note: Option<Note>,
    pub outcome: WriteOutcome,
}

impl NoteWrite {
    fn new(note: Option<Note>, outcome: WriteOutcome) -> Self {
        Self { note, outcome }
    }

    /// Writes are optimistic: an `Ok` write always succeeded locally
    pub fn success(&self) -> bool {
        true
    }

    pub fn from_cache(&self) -> bool {
        self.outcome != WriteOutcome::Synced
    }

    pub fn queued(&self) -> bool {
        matches!(
            self.outcome,
            WriteOutcome::Queued | WriteOutcome::QueuedAwaitingCreate
        )
    }

    pub fn is_temp(&self) -> bool {
        self.outcome == WriteOutcome::QueuedAwaitingCreate
    }
}

/// Tally of one queue drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Operations confirmed by the server and removed from the queue
    pub replayed: usize,
    /// Temp updates left queued because their create has not replayed
    pub deferred: usize,
    /// Operations whose server call failed; still queued
    pub failed: usize,
    /// Updates re-queued as temp updates
    pub converted: usize,
    /// Operations dropped without a server call
    pub discarded: usize,
    /// Whether the cache was refreshed from the server afterwards
    pub refreshed: bool,
}

/// What a `sync_to_server` call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum SyncOutcome {
    Offline,
    AlreadySyncing,
    Completed(SyncReport),
}

/// Snapshot for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_operations: i64,
}

enum ReplayStep {
    Replayed,
    Deferred,
    Converted,
    Discarded,
}

/// Clears the in-flight flag however the drain exits
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Offline-capable note coordinator
pub struct SyncService {
    cache: CacheStore,
    queue: OperationQueue,
    api: Arc<dyn NoteApi>,
    is_online: AtomicBool,
    is_syncing: AtomicBool,
}

impl SyncService {
    pub fn new(pool: SqlitePool, api: Arc<dyn NoteApi>, online: bool) -> Self {
        Self {
            cache: CacheStore::new(pool.clone()),
            queue: OperationQueue::new(pool),
            api,
            is_online: AtomicBool::new(online),
            is_syncing: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::SeqCst)
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    /// Record connectivity, returning the previous value
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.is_online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        previous
    }

    /// Create a note, on the server if possible and as a pending note otherwise
    pub async fn add_note(&self, draft: NoteDraft) -> Result<NoteWrite> {
        if self.is_online() {
            match self.api.create_note(&draft).await {
                Ok(note) => {
                    self.cache_advisory(&note).await;
                    tracing::info!("Note created on server: {}", note.id);
                    return Ok(NoteWrite::new(Some(note), WriteOutcome::Synced));
                }
                Err(e) => {
                    tracing::warn!("Create failed, keeping note offline: {}", e);
                }
            }
        }

        let temp_id = NoteId::new_pending();
        let note = Note::pending(temp_id.clone(), &draft);

        self.cache_advisory(&note).await;
        self.queue
            .queue_operation(&PendingOperation::Create {
                temp_id: temp_id.key(),
                draft,
            })
            .await?;

        tracing::info!("Note queued for creation: {}", temp_id);
        Ok(NoteWrite::new(Some(note), WriteOutcome::Queued))
    }

    /// Apply a partial update locally at once and on the server when possible
    pub async fn update_note(&self, id: &NoteId, updates: NoteUpdate) -> Result<NoteWrite> {
        let id = self.resolve_id(id).await;

        let merged = match self.cached_note(&id).await {
            Some(cached) => {
                let merged = cached.merged(&updates);
                self.cache_advisory(&merged).await;
                Some(merged)
            }
            None => None,
        };

        let real_id = match &id {
            NoteId::Confirmed(real_id) => *real_id,
            NoteId::Pending(temp_id) => {
                self.queue
                    .queue_operation(&PendingOperation::UpdateTemp {
                        temp_id: temp_id.clone(),
                        updates,
                    })
                    .await?;

                tracing::debug!("Update of {} waits for its create", temp_id);
                return Ok(NoteWrite::new(merged, WriteOutcome::QueuedAwaitingCreate));
            }
        };

        if self.is_online() && !self.update_waiting(real_id).await {
            match self.api.update_note(real_id, &updates).await {
                Ok(note) => {
                    self.cache_advisory(&note).await;
                    tracing::debug!("Note updated on server: {}", real_id);
                    return Ok(NoteWrite::new(Some(note), WriteOutcome::Synced));
                }
                Err(e) => {
                    tracing::warn!("Update of {} failed, queueing: {}", real_id, e);
                }
            }
        }

        self.queue
            .queue_operation(&PendingOperation::Update {
                note_id: id,
                updates,
            })
            .await?;

        Ok(NoteWrite::new(merged, WriteOutcome::Queued))
    }

    /// Delete a note; the cached copy is evicted immediately
    pub async fn delete_note(&self, id: &NoteId) -> Result<NoteWrite> {
        let id = self.resolve_id(id).await;

        let real_id = match &id {
            NoteId::Confirmed(real_id) => *real_id,
            NoteId::Pending(temp_id) => {
                let dropped = self.queue.remove_operations_for_temp(temp_id).await?;
                self.evict_advisory(&id).await;

                tracing::info!(
                    "Discarded unsynced note {} ({} queued operations dropped)",
                    temp_id,
                    dropped
                );
                return Ok(NoteWrite::new(None, WriteOutcome::DiscardedLocally));
            }
        };

        if self.is_online() {
            match self.api.delete_note(real_id).await {
                Ok(()) => {
                    self.evict_advisory(&id).await;
                    if let Err(e) = self.queue.remove_operations_for_note(real_id).await {
                        tracing::warn!("Failed to drop queued operations for {}: {}", real_id, e);
                    }
                    tracing::info!("Note deleted on server: {}", real_id);
                    return Ok(NoteWrite::new(None, WriteOutcome::Synced));
                }
                Err(e) => {
                    tracing::warn!("Delete of {} failed, queueing: {}", real_id, e);
                }
            }
        }

        self.queue
            .queue_operation(&PendingOperation::Delete {
                note_id: id.clone(),
            })
            .await?;
        self.evict_advisory(&id).await;

        Ok(NoteWrite::new(None, WriteOutcome::Queued))
    }

    /// Drain the queue against the server.
    ///
    /// No-op while offline or while another drain is in flight.
    pub async fn sync_to_server(&self) -> Result<SyncOutcome> {
        if !self.is_online() {
            tracing::debug!("Skipping sync while offline");
            return Ok(SyncOutcome::Offline);
        }

        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync already in progress");
            return Ok(SyncOutcome::AlreadySyncing);
        }
        let _guard = SyncGuard(&self.is_syncing);

        let report = self.drain_queue().await?;
        Ok(SyncOutcome::Completed(report))
    }

    /// Notes as the server has them, plus local notes still awaiting creation.
    ///
    /// Offline, or when the server cannot be reached, this is the cache as is.
    pub async fn refresh_cache(&self) -> Vec<Note> {
        if self.is_online() {
            self.refresh_from_server().await;
        }

        self.cached_notes().await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        let pending_operations = self.queue.len().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to count queued operations: {}", e);
            0
        });

        SyncStatus {
            is_online: self.is_online(),
            is_syncing: self.is_syncing(),
            pending_operations,
        }
    }

    pub async fn cached_note(&self, id: &NoteId) -> Option<Note> {
        self.cache.get_cached_note(id).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read cached note {}: {}", id, e);
            None
        })
    }

    pub async fn cached_notes(&self) -> Vec<Note> {
        self.cache.get_cached_notes().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read cached notes: {}", e);
            Vec::new()
        })
    }

    /// Drop every queued operation without replaying it
    pub async fn clear_sync_queue(&self) -> Result<u64> {
        self.queue.clear_sync_queue().await
    }

    async fn drain_queue(&self) -> Result<SyncReport> {
        let cutoff = Utc::now() - Duration::days(RESOLUTION_RETENTION_DAYS);
        if let Err(e) = self.queue.prune_resolutions(cutoff).await {
            tracing::warn!("Failed to prune temp id resolutions: {}", e);
        }

        let entries = self.queue.get_pending_entries().await?;
        let mut report = SyncReport::default();

        if entries.is_empty() {
            report.refreshed = self.refresh_from_server().await;
            return Ok(report);
        }

        tracing::info!("Syncing {} queued operations", entries.len());

        let mut resolved = self.queue.resolutions().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load temp id resolutions: {}", e);
            HashMap::new()
        });

        for (queue_id, entry) in &entries {
            let queued = match entry {
                Ok(queued) => queued,
                Err(e) => {
                    tracing::error!("Queued operation #{} cannot be decoded: {}", queue_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match self.replay(queued, &mut resolved).await {
                Ok(ReplayStep::Replayed) => report.replayed += 1,
                Ok(ReplayStep::Deferred) => report.deferred += 1,
                Ok(ReplayStep::Converted) => report.converted += 1,
                Ok(ReplayStep::Discarded) => report.discarded += 1,
                Err(e) => {
                    tracing::error!(
                        "Failed to replay {} operation #{}: {}",
                        queued.operation.kind(),
                        queued.queue_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report.refreshed = self.refresh_from_server().await;

        tracing::info!(
            "Sync finished: {} replayed, {} deferred, {} failed, {} converted, {} discarded",
            report.replayed,
            report.deferred,
            report.failed,
            report.converted,
            report.discarded
        );

        Ok(report)
    }

    async fn replay(
        &self,
        queued: &QueuedOperation,
        resolved: &mut HashMap<String, i64>,
    ) -> Result<ReplayStep> {
        match &queued.operation {
            PendingOperation::Create { temp_id, draft } => {
                let note = self.api.create_note(draft).await?;
                let real_id = note
                    .id
                    .confirmed()
                    .ok_or_else(|| SyncError::InvalidNoteId(note.id.key()))?;

                resolved.insert(temp_id.clone(), real_id);
                if let Err(e) = self.queue.record_resolution(temp_id, real_id).await {
                    tracing::warn!("Failed to persist resolution of {}: {}", temp_id, e);
                }

                self.evict_advisory(&NoteId::Pending(temp_id.clone())).await;

                if !self.queue.remove_synced_operation(queued.queue_id).await? {
                    // Deleted locally while the create was in flight
                    tracing::info!("Note {} was deleted during its creation", temp_id);
                    self.delete_or_requeue(real_id).await?;
                    return Ok(ReplayStep::Discarded);
                }

                self.cache_advisory(&note).await;
                tracing::debug!("Created {} as {}", temp_id, real_id);
                Ok(ReplayStep::Replayed)
            }

            PendingOperation::UpdateTemp { temp_id, updates } => {
                let Some(&real_id) = resolved.get(temp_id) else {
                    tracing::debug!("Deferring update of {} until it is created", temp_id);
                    return Ok(ReplayStep::Deferred);
                };

                let note = self.api.update_note(real_id, updates).await?;
                self.queue.remove_synced_operation(queued.queue_id).await?;
                self.cache_advisory(&note).await;
                Ok(ReplayStep::Replayed)
            }

            PendingOperation::Update { note_id, updates } => match note_id {
                NoteId::Confirmed(real_id) => {
                    let note = self.api.update_note(*real_id, updates).await?;
                    self.queue.remove_synced_operation(queued.queue_id).await?;
                    self.cache_advisory(&note).await;
                    Ok(ReplayStep::Replayed)
                }
                NoteId::Pending(temp_id) => {
                    self.queue
                        .queue_operation(&PendingOperation::UpdateTemp {
                            temp_id: temp_id.clone(),
                            updates: updates.clone(),
                        })
                        .await?;
                    self.queue.remove_synced_operation(queued.queue_id).await?;

                    tracing::debug!("Converted update of {} to a temp update", temp_id);
                    Ok(ReplayStep::Converted)
                }
            },

            PendingOperation::Delete { note_id } => {
                let real_id = match note_id {
                    NoteId::Confirmed(real_id) => *real_id,
                    NoteId::Pending(temp_id) => match resolved.get(temp_id) {
                        Some(&real_id) => real_id,
                        None => {
                            self.queue.remove_operations_for_temp(temp_id).await?;
                            self.queue.remove_synced_operation(queued.queue_id).await?;
                            self.evict_advisory(note_id).await;

                            tracing::debug!("Dropped never-created note {}", temp_id);
                            return Ok(ReplayStep::Discarded);
                        }
                    },
                };

                self.api.delete_note(real_id).await?;
                self.queue.remove_synced_operation(queued.queue_id).await?;
                self.evict_advisory(&NoteId::Confirmed(real_id)).await;
                Ok(ReplayStep::Replayed)
            }
        }
    }

    /// Delete a just-created note, queueing the delete if the server refuses
    async fn delete_or_requeue(&self, real_id: i64) -> Result<()> {
        if let Err(e) = self.api.delete_note(real_id).await {
            tracing::warn!("Delete of {} failed, queueing: {}", real_id, e);
            self.queue
                .queue_operation(&PendingOperation::Delete {
                    note_id: NoteId::Confirmed(real_id),
                })
                .await?;
        }
        Ok(())
    }

    /// Overwrite confirmed cache entries with the server's notes
    async fn refresh_from_server(&self) -> bool {
        let notes = match self.api.list_notes().await {
            Ok(notes) => notes,
            Err(e) => {
                tracing::warn!("Failed to refresh cache from server: {}", e);
                return false;
            }
        };

        let pending_deletes = self.queue.pending_delete_ids().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read queued deletes: {}", e);
            HashSet::new()
        });

        let notes: Vec<Note> = notes
            .into_iter()
            .filter(|note| {
                note.id
                    .confirmed()
                    .map_or(true, |id| !pending_deletes.contains(&id))
            })
            .collect();

        match self.cache.replace_confirmed_notes(&notes).await {
            Ok(()) => {
                tracing::debug!("Cache refreshed with {} notes", notes.len());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to store refreshed notes: {}", e);
                false
            }
        }
    }

    /// Whether an older update of this note still waits in the queue;
    /// newer updates then queue behind it to keep write order
    async fn update_waiting(&self, real_id: i64) -> bool {
        match self.queue.has_queued_update(real_id).await {
            Ok(waiting) => {
                if waiting {
                    tracing::debug!("Update of {} queued behind an earlier one", real_id);
                }
                waiting
            }
            Err(e) => {
                tracing::warn!("Failed to check queued updates of {}: {}", real_id, e);
                true
            }
        }
    }

    /// Route a temp id whose create already replayed to its server id
    async fn resolve_id(&self, id: &NoteId) -> NoteId {
        let NoteId::Pending(temp_id) = id else {
            return id.clone();
        };

        match self.queue.resolve_temp_id(temp_id).await {
            Ok(Some(real_id)) => NoteId::Confirmed(real_id),
            Ok(None) => id.clone(),
            Err(e) => {
                tracing::warn!("Failed to resolve {}: {}", temp_id, e);
                id.clone()
            }
        }
    }

    async fn cache_advisory(&self, note: &Note) {
        if let Err(e) = self.cache.cache_single_note(note).await {
            tracing::warn!("Failed to cache note {}: {}", note.id, e);
        }
    }

    async fn evict_advisory(&self, id: &NoteId) {
        if let Err(e) = self.cache.delete_cached_note(id).await {
            tracing::warn!("Failed to evict cached note {}: {}", id, e);
        }
    }
}
