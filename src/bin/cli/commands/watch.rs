use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::Result;

use docsync_lib::sync::{start_auto_sync, AppState, LocalStateProvider};

use crate::app::App;
use crate::OutputFormat;

/// How often the state file is checked for local edits
const CHANGE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Local state backed by the JSON state file
struct FileStateProvider {
    path: PathBuf,
    /// Modification time of our own last write, so adopting a merge is not
    /// mistaken for a local edit
    written_at: Mutex<Option<SystemTime>>,
}

impl FileStateProvider {
    fn modified(&self) -> Option<SystemTime> {
        modified(&self.path)
    }
}

impl LocalStateProvider for FileStateProvider {
    fn snapshot(&self) -> AppState {
        App::load_state(&self.path).unwrap_or_else(|e| {
            log::warn!("Watch: could not read local state, syncing empty state: {:#}", e);
            AppState::default()
        })
    }

    fn adopt(&self, merged: AppState) {
        match App::save_state(&self.path, &merged) {
            Ok(()) => *self.written_at.lock().unwrap() = self.modified(),
            Err(e) => log::error!("Watch: could not store merged state: {:#}", e),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Run the auto-sync scheduler until interrupted
pub async fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let state_path = app.state_path();
    let provider = Arc::new(FileStateProvider {
        path: state_path.clone(),
        written_at: Mutex::new(modified(&state_path)),
    });

    let scheduler = start_auto_sync(
        Arc::clone(&app.manager),
        provider.clone(),
        app.config.scheduler.clone(),
    );
    scheduler.sync_now();

    if let OutputFormat::Plain = format {
        println!(
            "Watching {} (Ctrl-C to stop)",
            state_path.display()
        );
    }

    let mut last_seen = modified(&state_path);
    let mut ticker = tokio::time::interval(CHANGE_CHECK_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = modified(&state_path);
                let ours = *provider.written_at.lock().unwrap();
                if current != last_seen && current != ours {
                    log::debug!("Watch: local state changed");
                    scheduler.local_changed();
                }
                last_seen = current;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    scheduler.shutdown();
    if let OutputFormat::Plain = format {
        println!("Stopped");
    }
    Ok(())
}
