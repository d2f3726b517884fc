//! Sync layer configuration constants
//!
//! Central location for identifiers, defaults, and validation boundaries
//! used by the cache, the queue, and the connectivity probe.

use std::time::Duration;

// ===== Identifiers =====

/// Prefix marking a client-generated note id that the server has not confirmed
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Number of random characters appended to a temp id
pub const TEMP_ID_RANDOM_LEN: usize = 9;

// ===== Storage =====

/// File name of the cache database inside the data directory
pub const CACHE_DB_FILE: &str = "studai-cache.db";

/// File name of the settings document inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "STUDAI_SYNC_DATA_DIR";

/// Data directory used when the environment does not name one
pub const DEFAULT_DATA_DIR: &str = "studai-data";

/// Days a temp id resolution is kept once nothing in the queue refers to it
pub const RESOLUTION_RETENTION_DAYS: i64 = 7;

/// How long a writer waits on a locked database before giving up
pub const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ===== Remote API =====

/// Base URL of the note API when settings do not override it
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// User agent sent with every API request
pub const USER_AGENT: &str = "StudAI-Sync";

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Minimum per-request timeout in seconds
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;

/// Maximum per-request timeout in seconds (5 minutes)
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

// ===== Connectivity probe =====

/// Default interval between reachability probes in seconds
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// Minimum probe interval in seconds.
/// Shorter intervals hammer the backend while it is down.
pub const MIN_PROBE_INTERVAL_SECS: u64 = 2;

/// Maximum probe interval in seconds (1 hour)
pub const MAX_PROBE_INTERVAL_SECS: u64 = 3_600;
