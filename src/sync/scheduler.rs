use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::config::SchedulerSettings;
use super::manager::SyncManager;
use super::merge::merge;
use super::payload::AppState;

/// Messages to control the auto-sync scheduler
#[derive(Debug)]
pub enum SyncSchedulerMessage {
    /// Local state changed; sync once changes settle
    LocalChanged,
    /// App window regained focus
    FocusGained,
    /// Network came back
    ConnectivityRestored,
    /// App became visible or hidden; hidden apps poll less often
    VisibilityChanged { visible: bool },
    /// Sync immediately
    SyncNow,
    /// App closing
    Shutdown,
}

/// Source of the local state to sync and sink for merged results
pub trait LocalStateProvider: Send + Sync + 'static {
    /// Current local state
    fn snapshot(&self) -> AppState;

    /// Replace the local state with the result of a sync. The scheduler has
    /// already merged in edits made while the sync was running.
    fn adopt(&self, merged: AppState);
}

/// Handle for the auto-sync scheduler
pub struct AutoSyncScheduler {
    sender: mpsc::Sender<SyncSchedulerMessage>,
}

impl AutoSyncScheduler {
    /// Notify scheduler of a local change (debounced)
    pub fn local_changed(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::LocalChanged);
    }

    pub fn focus_gained(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::FocusGained);
    }

    pub fn connectivity_restored(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::ConnectivityRestored);
    }

    pub fn set_visible(&self, visible: bool) {
        let _ = self
            .sender
            .try_send(SyncSchedulerMessage::VisibilityChanged { visible });
    }

    pub fn sync_now(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::SyncNow);
    }

    /// Shut down the scheduler
    pub fn shutdown(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::Shutdown);
    }

    /// Get a clone of the internal sender for external trigger sources
    pub fn sender_clone(&self) -> mpsc::Sender<SyncSchedulerMessage> {
        self.sender.clone()
    }
}

/// Start the auto-sync scheduler.
///
/// Spawns a loop on the current tokio runtime that turns local changes,
/// focus, connectivity and the poll timer into `SyncManager::sync` calls.
pub fn start_auto_sync(
    manager: Arc<SyncManager>,
    provider: Arc<dyn LocalStateProvider>,
    settings: SchedulerSettings,
) -> AutoSyncScheduler {
    let (tx, rx) = mpsc::channel(32);

    let resync = tx.downgrade();
    tokio::spawn(async move {
        auto_sync_loop(manager, provider, settings, rx, resync).await;
    });

    AutoSyncScheduler { sender: tx }
}

async fn auto_sync_loop(
    manager: Arc<SyncManager>,
    provider: Arc<dyn LocalStateProvider>,
    settings: SchedulerSettings,
    mut receiver: mpsc::Receiver<SyncSchedulerMessage>,
    resync: mpsc::WeakSender<SyncSchedulerMessage>,
) {
    log::info!(
        "Sync scheduler: started (debounce {}ms, poll {}s)",
        settings.debounce_ms,
        settings.poll_interval(true).as_secs()
    );

    let mut visible = true;
    let mut last_poll = Instant::now();
    let mut debounce_deadline: Option<Instant> = None;

    loop {
        let next_poll = last_poll + settings.poll_interval(visible);
        let pending_deadline = debounce_deadline;
        let debounced = async move {
            match pending_deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = debounced => {
                debounce_deadline = None;
                trigger(&manager, &provider, &resync, "local change");
            }

            _ = sleep_until(next_poll) => {
                last_poll = Instant::now();
                trigger(&manager, &provider, &resync, "poll");
            }

            msg = receiver.recv() => {
                match msg {
                    Some(SyncSchedulerMessage::LocalChanged) => {
                        // Each change pushes the deadline back
                        debounce_deadline = Some(Instant::now() + settings.debounce());
                    }
                    Some(SyncSchedulerMessage::FocusGained) => {
                        trigger(&manager, &provider, &resync, "focus");
                    }
                    Some(SyncSchedulerMessage::ConnectivityRestored) => {
                        trigger(&manager, &provider, &resync, "connectivity restored");
                    }
                    Some(SyncSchedulerMessage::SyncNow) => {
                        trigger(&manager, &provider, &resync, "manual");
                    }
                    Some(SyncSchedulerMessage::VisibilityChanged { visible: now_visible }) => {
                        visible = now_visible;
                        log::info!(
                            "Sync scheduler: app {}, polling every {}s",
                            if visible { "visible" } else { "hidden" },
                            settings.poll_interval(visible).as_secs()
                        );
                    }
                    Some(SyncSchedulerMessage::Shutdown) | None => {
                        log::info!("Sync scheduler: shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Start a sync in the background unless one is already running
fn trigger(
    manager: &Arc<SyncManager>,
    provider: &Arc<dyn LocalStateProvider>,
    resync: &mpsc::WeakSender<SyncSchedulerMessage>,
    reason: &'static str,
) {
    if manager.is_syncing() {
        log::debug!("Sync scheduler: {} trigger dropped, sync in progress", reason);
        return;
    }

    let manager = Arc::clone(manager);
    let provider = Arc::clone(provider);
    let resync = resync.clone();
    tokio::spawn(async move {
        log::info!("Sync scheduler: running sync ({})", reason);
        let report = manager.sync(&provider.snapshot()).await;

        if report.outcome.skipped {
            return;
        }
        if let Some(merged) = report.merged {
            // Local edits made during the sync were not part of the merge;
            // fold them in and sync again so they reach the remote
            let current = merge(provider.snapshot(), &merged);
            let edited_meanwhile = current != merged;
            provider.adopt(current);

            if edited_meanwhile {
                log::info!("Sync scheduler: local state changed during sync");
                if let Some(sender) = resync.upgrade() {
                    let _ = sender.try_send(SyncSchedulerMessage::LocalChanged);
                }
            }
        }

        if report.outcome.success {
            log::info!("Sync scheduler: sync complete ({})", reason);
        } else {
            log::error!(
                "Sync scheduler: sync failed for {:?} ({})",
                report.outcome.failed_domains(),
                reason
            );
        }
    });
}
