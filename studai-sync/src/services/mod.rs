//! Services module
//!
//! Coordination between the local stores, the remote API, and connectivity.

pub mod connectivity;
pub mod settings;
pub mod sync;

pub use connectivity::{Connectivity, ConnectivityObserver, ConnectivityProbe};
pub use settings::{SettingsService, SyncSettings};
pub use sync::{NoteWrite, SyncOutcome, SyncReport, SyncService, SyncStatus, WriteOutcome};
