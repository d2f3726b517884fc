//! Application state and initialization
//!
//! Composition root: settings, cache database, API client, and the sync
//! service are built here once and handed out through `AppState`.

use crate::config::{CACHE_DB_FILE, DATA_DIR_ENV, DEFAULT_DATA_DIR};
use crate::database::create_pool;
use crate::error::Result;
use crate::remote::{HttpNoteApi, NoteApi};
use crate::services::{SettingsService, SyncService, SyncSettings};
use std::path::PathBuf;
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: SyncSettings,
    pub api: Arc<dyn NoteApi>,
    pub sync_service: Arc<SyncService>,
}

/// Data directory named by the environment, or the default one
pub fn data_dir_from_env() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Application setup - called once on startup
pub async fn setup(data_dir: PathBuf) -> Result<AppState> {
    tracing::info!("Initializing sync layer");
    tracing::info!("Data directory: {:?}", data_dir);

    std::fs::create_dir_all(&data_dir)?;

    let settings = SettingsService::new(data_dir.clone()).load().await?;
    tracing::info!("Note API: {}", settings.api_base_url);

    let pool = create_pool(&data_dir.join(CACHE_DB_FILE)).await?;
    let api: Arc<dyn NoteApi> = Arc::new(HttpNoteApi::from_settings(&settings)?);
    let sync_service = Arc::new(SyncService::new(pool, api.clone(), settings.start_online));

    tracing::info!("Sync layer initialized");

    Ok(AppState {
        data_dir,
        settings,
        api,
        sync_service,
    })
}
