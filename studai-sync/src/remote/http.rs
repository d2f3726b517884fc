//! HTTP client for the StudAI note backend
//!
//! Endpoints consumed:
//! - `GET    {base}/notes`         -> `{ "notes": [...] }`
//! - `POST   {base}/notes/create`  -> `{ "note": {...} }`
//! - `PUT    {base}/notes/{id}`    -> `{ "note": {...} }`
//! - `DELETE {base}/notes/{id}`    -> any 2xx body

use super::{NoteApi, NoteEnvelope, NotesEnvelope};
use crate::config::USER_AGENT;
use crate::database::{Note, NoteDraft, NoteUpdate};
use crate::error::{Result, SyncError};
use crate::services::settings::SyncSettings;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;

/// `NoteApi` over HTTP
#[derive(Clone)]
pub struct HttpNoteApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpNoteApi {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            auth_token,
        })
    }

    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        Self::new(
            settings.api_base_url.clone(),
            settings.auth_token.clone(),
            settings.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));

        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn a non-2xx response into `SyncError::Api`
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        tracing::warn!("Note API returned {}: {}", status, message);

        Err(SyncError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NoteApi for HttpNoteApi {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        let response = self.request(Method::GET, "notes").send().await?;
        let envelope: NotesEnvelope = Self::check(response).await?.json().await?;

        envelope.notes.into_iter().map(Note::try_from).collect()
    }

    async fn create_note(&self, draft: &NoteDraft) -> Result<Note> {
        let response = self
            .request(Method::POST, "notes/create")
            .json(draft)
            .send()
            .await?;
        let envelope: NoteEnvelope = Self::check(response).await?.json().await?;

        Note::try_from(envelope.note)
    }

    async fn update_note(&self, id: i64, updates: &NoteUpdate) -> Result<Note> {
        let response = self
            .request(Method::PUT, &format!("notes/{}", id))
            .json(updates)
            .send()
            .await?;
        let envelope: NoteEnvelope = Self::check(response).await?.json().await?;

        Note::try_from(envelope.note)
    }

    async fn delete_note(&self, id: i64) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("notes/{}", id))
            .send()
            .await?;
        Self::check(response).await?;

        Ok(())
    }

    async fn ping(&self) -> bool {
        match self.request(Method::GET, "").send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Note API unreachable: {}", e);
                false
            }
        }
    }
}
