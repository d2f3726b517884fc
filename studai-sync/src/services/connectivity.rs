//! Connectivity observer
//!
//! Connectivity arrives as a `watch` channel of [`Connectivity`] values.
//! The observer mirrors it into the sync service and starts a queue drain
//! whenever the channel reports `Online`. The probe feeds that channel by
//! periodically checking whether the note backend answers.

use crate::remote::NoteApi;
use crate::services::sync::{SyncOutcome, SyncService};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Network state as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// Applies connectivity changes to a [`SyncService`]
pub struct ConnectivityObserver;

impl ConnectivityObserver {
    /// Follow `signal` until its sender is dropped.
    ///
    /// The state current at spawn time is applied first.
    pub fn spawn(
        service: Arc<SyncService>,
        mut signal: watch::Receiver<Connectivity>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Starting connectivity observer");

            let initial = *signal.borrow_and_update();
            Self::apply(&service, initial).await;

            while signal.changed().await.is_ok() {
                let state = *signal.borrow_and_update();
                Self::apply(&service, state).await;
            }

            tracing::info!("Connectivity signal closed, observer stopped");
        })
    }

    /// Going online flips the flag and drains the queue; going offline only flips the flag
    pub async fn apply(service: &SyncService, state: Connectivity) {
        match state {
            Connectivity::Online => {
                service.set_online(true);

                match service.sync_to_server().await {
                    Ok(SyncOutcome::Completed(report)) => {
                        tracing::debug!("Reconnect sync finished: {:?}", report);
                    }
                    Ok(outcome) => {
                        tracing::debug!("Reconnect sync skipped: {:?}", outcome);
                    }
                    Err(e) => {
                        tracing::error!("Reconnect sync failed: {}", e);
                    }
                }
            }
            Connectivity::Offline => {
                service.set_online(false);
            }
        }
    }
}

/// Periodic reachability check of the note backend
pub struct ConnectivityProbe {
    api: Arc<dyn NoteApi>,
    interval: Duration,
    sender: watch::Sender<Connectivity>,
}

impl ConnectivityProbe {
    pub fn new(
        api: Arc<dyn NoteApi>,
        interval: Duration,
        initial: Connectivity,
    ) -> (Self, watch::Receiver<Connectivity>) {
        let (sender, receiver) = watch::channel(initial);
        (
            Self {
                api,
                interval,
                sender,
            },
            receiver,
        )
    }

    /// Probe once and publish the result if it differs from the last one
    pub async fn probe_once(&self) -> Connectivity {
        let state = Connectivity::from(self.api.ping().await);

        let changed = self.sender.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });

        if changed {
            tracing::info!("Note backend is now {:?}", state);
        }

        state
    }

    /// Probe on every interval tick until all receivers are gone
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Starting connectivity probe every {:?}", self.interval);

            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                if self.sender.is_closed() {
                    break;
                }

                self.probe_once().await;
            }

            tracing::info!("Connectivity probe stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Note, NoteDraft, NoteUpdate};
    use crate::error::{Result, SyncError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Backend whose reachability is switched by the test; every write fails
    struct SwitchedApi {
        reachable: AtomicBool,
    }

    #[async_trait]
    impl NoteApi for SwitchedApi {
        async fn list_notes(&self) -> Result<Vec<Note>> {
            Ok(Vec::new())
        }

        async fn create_note(&self, _draft: &NoteDraft) -> Result<Note> {
            Err(SyncError::Generic("unavailable".to_string()))
        }

        async fn update_note(&self, _id: i64, _updates: &NoteUpdate) -> Result<Note> {
            Err(SyncError::Generic("unavailable".to_string()))
        }

        async fn delete_note(&self, _id: i64) -> Result<()> {
            Err(SyncError::Generic("unavailable".to_string()))
        }

        async fn ping(&self) -> bool {
            self.reachable.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_probe_publishes_only_changes() {
        let api = Arc::new(SwitchedApi {
            reachable: AtomicBool::new(true),
        });
        let (probe, mut receiver) =
            ConnectivityProbe::new(api.clone(), Duration::from_secs(60), Connectivity::Online);

        assert_eq!(probe.probe_once().await, Connectivity::Online);
        assert!(!receiver.has_changed().unwrap());

        api.reachable.store(false, Ordering::SeqCst);
        assert_eq!(probe.probe_once().await, Connectivity::Offline);
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), Connectivity::Offline);
    }

    #[tokio::test]
    async fn test_offline_only_flips_flag() {
        let pool = crate::database::open_in_memory().await.unwrap();
        let api = Arc::new(SwitchedApi {
            reachable: AtomicBool::new(false),
        });
        let service = SyncService::new(pool, api, true);

        ConnectivityObserver::apply(&service, Connectivity::Offline).await;

        let status = service.sync_status().await;
        assert!(!status.is_online);
        assert!(!status.is_syncing);
    }

    #[test]
    fn test_connectivity_from_bool() {
        assert_eq!(Connectivity::from(true), Connectivity::Online);
        assert_eq!(Connectivity::from(false), Connectivity::Offline);
    }
}
