use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use docsync_lib::storage::FileStore;
use docsync_lib::sync::{
    AppState, ConfigFile, CredentialStore, HttpDocumentClient, SyncContext, SyncManager,
};

const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "sync.json";
const STATE_FILE: &str = "state.json";

/// Shared application state for CLI commands
pub struct App {
    pub data_dir: PathBuf,
    pub config: ConfigFile,
    pub manager: Arc<SyncManager>,
}

impl App {
    /// Initialize from the given or the default data directory
    pub fn new(data_dir: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => FileStore::default_data_dir().context("Failed to get data directory")?,
        };

        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.join(CONFIG_FILE));
        let config = ConfigFile::load(&config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;

        let store = FileStore::open(data_dir.join(CREDENTIALS_FILE))
            .context("Failed to open credential store")?;
        let credentials =
            CredentialStore::load_with_keyring(Arc::new(store), config.sync.keyring_service.clone())
                .context("Failed to load credentials")?;

        let api = HttpDocumentClient::new(&config.sync).context("Invalid API settings")?;
        let ctx = SyncContext::new(Arc::new(api), Arc::new(credentials), config.sync.clone());

        Ok(Self {
            data_dir,
            manager: Arc::new(SyncManager::new(ctx)),
            config,
        })
    }

    /// Default location of the local state file
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    /// Read the local state; a missing file is an empty state
    pub fn load_state(path: &Path) -> Result<AppState> {
        if !path.exists() {
            return Ok(AppState::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if data.trim().is_empty() {
            return Ok(AppState::default());
        }
        serde_json::from_str(&data).with_context(|| format!("Invalid state file {}", path.display()))
    }

    pub fn save_state(path: &Path, state: &AppState) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let data = serde_json::to_string_pretty(state)?;
        std::fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_lib::sync::IdRecord;

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        assert_eq!(App::load_state(&path).unwrap(), AppState::default());

        let mut state = AppState::default();
        state.todos.todos.push(IdRecord::new("1"));
        App::save_state(&path, &state).unwrap();
        assert_eq!(App::load_state(&path).unwrap(), state);
    }

    #[test]
    fn test_app_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Some(dir.path()), None).unwrap();

        assert_eq!(app.state_path(), dir.path().join("state.json"));
        assert!(!app.manager.is_authenticated());
    }
}
