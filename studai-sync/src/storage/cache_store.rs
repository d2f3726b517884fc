//! Local cache store
//!
//! Durable client-side copy of notes and plans, keyed by id.
//! The cache is advisory: the server stays the source of truth and
//! periodically overwrites confirmed entries. Pending (temp id) entries
//! survive those overwrites until their create is replayed.

use crate::database::{Note, NoteId, Plan};
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool};

#[derive(FromRow)]
struct NoteRow {
    id: String,
    title: String,
    content: String,
    words: i64,
    created_at: DateTime<Utc>,
    is_shared: bool,
    is_pinned: bool,
    category: Option<String>,
    category_id: Option<i64>,
}

impl TryFrom<NoteRow> for Note {
    type Error = crate::error::SyncError;

    fn try_from(row: NoteRow) -> Result<Self> {
        Ok(Note {
            id: row.id.parse()?,
            title: row.title,
            content: row.content,
            words: row.words,
            created_at: row.created_at,
            is_shared: row.is_shared,
            is_pinned: row.is_pinned,
            category: row.category,
            category_id: row.category_id,
        })
    }
}

async fn upsert_note<'e, E>(executor: E, note: &Note) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO notes (id, is_pending, title, content, words, created_at,
                           is_shared, is_pinned, category, category_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            is_pending = excluded.is_pending,
            title = excluded.title,
            content = excluded.content,
            words = excluded.words,
            created_at = excluded.created_at,
            is_shared = excluded.is_shared,
            is_pinned = excluded.is_pinned,
            category = excluded.category,
            category_id = excluded.category_id
        "#,
    )
    .bind(note.id.key())
    .bind(note.id.is_pending())
    .bind(&note.title)
    .bind(&note.content)
    .bind(note.words)
    .bind(note.created_at)
    .bind(note.is_shared)
    .bind(note.is_pinned)
    .bind(&note.category)
    .bind(note.category_id)
    .execute(executor)
    .await?;

    Ok(())
}

async fn upsert_plan<'e, E>(executor: E, plan: &Plan) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO plans (id, title, description, due_date, completed, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            due_date = excluded.due_date,
            completed = excluded.completed,
            created_at = excluded.created_at
        "#,
    )
    .bind(&plan.id)
    .bind(&plan.title)
    .bind(&plan.description)
    .bind(plan.due_date)
    .bind(plan.completed)
    .bind(plan.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Cache of notes and plans
#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bulk upsert; entries with other ids are left alone
    pub async fn cache_notes(&self, notes: &[Note]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for note in notes {
            upsert_note(&mut *tx, note).await?;
        }

        tx.commit().await?;

        tracing::debug!("Cached {} notes", notes.len());
        Ok(())
    }

    /// Upsert a single note
    pub async fn cache_single_note(&self, note: &Note) -> Result<()> {
        upsert_note(&self.pool, note).await?;

        tracing::debug!("Cached note: {}", note.id);
        Ok(())
    }

    /// Get a note by id, `None` when absent
    pub async fn get_cached_note(&self, id: &NoteId) -> Result<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>("SELECT * FROM notes WHERE id = ?")
            .bind(id.key())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Note::try_from).transpose()
    }

    /// All cached notes, newest first
    pub async fn get_cached_notes(&self) -> Result<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>("SELECT * FROM notes ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Note::try_from).collect()
    }

    /// Remove a note from the cache; missing ids are not an error
    pub async fn delete_cached_note(&self, id: &NoteId) -> Result<()> {
        sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id.key())
            .execute(&self.pool)
            .await?;

        tracing::debug!("Evicted cached note: {}", id);
        Ok(())
    }

    /// Replace every confirmed note with the server's collection.
    ///
    /// Pending notes are kept: they exist only here until their create replays.
    pub async fn replace_confirmed_notes(&self, notes: &[Note]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM notes WHERE is_pending = 0")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for note in notes {
            upsert_note(&mut *tx, note).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Replaced {} confirmed notes with {} from server",
            removed,
            notes.len()
        );
        Ok(())
    }

    /// Bulk upsert plans
    pub async fn cache_plans(&self, plans: &[Plan]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for plan in plans {
            upsert_plan(&mut *tx, plan).await?;
        }

        tx.commit().await?;

        tracing::debug!("Cached {} plans", plans.len());
        Ok(())
    }

    pub async fn cache_single_plan(&self, plan: &Plan) -> Result<()> {
        upsert_plan(&self.pool, plan).await
    }

    pub async fn get_cached_plan(&self, id: &str) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, PlanRow>("SELECT * FROM plans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(plan.map(Plan::from))
    }

    pub async fn get_cached_plans(&self) -> Result<Vec<Plan>> {
        let plans = sqlx::query_as::<_, PlanRow>("SELECT * FROM plans ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(plans.into_iter().map(Plan::from).collect())
    }

    pub async fn delete_cached_plan(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM plans WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Evicted cached plan: {}", id);
        Ok(())
    }
}

#[derive(FromRow)]
struct PlanRow {
    id: String,
    title: String,
    description: Option<String>,
    due_date: Option<DateTime<Utc>>,
    completed: bool,
    created_at: DateTime<Utc>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: row.id,
            title: row.title,
            description: row.description,
            due_date: row.due_date,
            completed: row.completed,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{open_in_memory, NoteDraft};

    async fn create_test_store() -> CacheStore {
        CacheStore::new(open_in_memory().await.unwrap())
    }

    fn confirmed_note(id: i64, title: &str) -> Note {
        Note::pending(NoteId::Confirmed(id), &NoteDraft::new(title, "some body text"))
    }

    #[tokio::test]
    async fn test_missing_note_is_none() {
        let store = create_test_store().await;

        let note = store.get_cached_note(&NoteId::Confirmed(404)).await.unwrap();
        assert!(note.is_none());
        assert!(store.get_cached_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_notes_upserts_and_leaves_others() {
        let store = create_test_store().await;

        store
            .cache_notes(&[confirmed_note(1, "One"), confirmed_note(2, "Two")])
            .await
            .unwrap();

        store
            .cache_notes(&[confirmed_note(2, "Two again")])
            .await
            .unwrap();

        let notes = store.get_cached_notes().await.unwrap();
        assert_eq!(notes.len(), 2);

        let one = store.get_cached_note(&NoteId::Confirmed(1)).await.unwrap().unwrap();
        assert_eq!(one.title, "One");

        let two = store.get_cached_note(&NoteId::Confirmed(2)).await.unwrap().unwrap();
        assert_eq!(two.title, "Two again");
        assert_eq!(two.words, 3);
    }

    #[tokio::test]
    async fn test_pending_note_round_trips_its_id() {
        let store = create_test_store().await;

        let id = NoteId::new_pending();
        let note = Note::pending(id.clone(), &NoteDraft::new("Draft", ""));
        store.cache_single_note(&note).await.unwrap();

        let cached = store.get_cached_note(&id).await.unwrap().unwrap();
        assert_eq!(cached.id, id);
        assert_eq!(cached.words, 0);
    }

    #[tokio::test]
    async fn test_delete_cached_note() {
        let store = create_test_store().await;

        store.cache_single_note(&confirmed_note(9, "Gone")).await.unwrap();
        store.delete_cached_note(&NoteId::Confirmed(9)).await.unwrap();
        store.delete_cached_note(&NoteId::Confirmed(9)).await.unwrap();

        assert!(store.get_cached_note(&NoteId::Confirmed(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_confirmed_keeps_pending() {
        let store = create_test_store().await;

        let pending_id = NoteId::new_pending();
        store
            .cache_notes(&[
                confirmed_note(1, "Stale"),
                Note::pending(pending_id.clone(), &NoteDraft::new("Offline", "x")),
            ])
            .await
            .unwrap();

        store
            .replace_confirmed_notes(&[confirmed_note(5, "Fresh")])
            .await
            .unwrap();

        let notes = store.get_cached_notes().await.unwrap();
        let ids: Vec<NoteId> = notes.into_iter().map(|n| n.id).collect();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&NoteId::Confirmed(5)));
        assert!(ids.contains(&pending_id));
        assert!(!ids.contains(&NoteId::Confirmed(1)));
    }

    #[tokio::test]
    async fn test_plans() {
        let store = create_test_store().await;

        let plan = Plan {
            id: "plan-1".to_string(),
            title: "Finals week".to_string(),
            description: Some("Chemistry then history".to_string()),
            due_date: Some(Utc::now()),
            completed: false,
            created_at: Utc::now(),
        };

        store.cache_plans(&[plan.clone()]).await.unwrap();

        let cached = store.get_cached_plan("plan-1").await.unwrap().unwrap();
        assert_eq!(cached.title, "Finals week");
        assert_eq!(store.get_cached_plans().await.unwrap().len(), 1);

        store
            .cache_single_plan(&Plan {
                completed: true,
                ..plan
            })
            .await
            .unwrap();
        assert!(store.get_cached_plan("plan-1").await.unwrap().unwrap().completed);

        store.delete_cached_plan("plan-1").await.unwrap();
        assert!(store.get_cached_plan("plan-1").await.unwrap().is_none());
    }
}
