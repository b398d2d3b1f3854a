use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::SyncError;
use super::payload::AppState;
use super::registry::Domain;

/// Default base URL of the remote document API
pub const DEFAULT_API_BASE_URL: &str = "https://api.docsync.dev";

/// Connection and behaviour settings for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Base URL of the document API (e.g. "https://api.example.com")
    pub api_base_url: String,
    /// Endpoint exchanging an OAuth authorization code for a bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_exchange_url: Option<String>,
    /// Upper bound for any single remote call, in seconds
    pub request_timeout_secs: u64,
    /// TCP/TLS connect timeout, in seconds
    pub connect_timeout_secs: u64,
    /// Visibility of newly created resources
    pub visibility: Visibility,
    /// OS keyring service used to mirror the bearer token (disabled when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyring_service: Option<String>,
    pub user_agent: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_exchange_url: None,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            visibility: Visibility::Private,
            keyring_service: None,
            user_agent: format!("docsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SyncSettings {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_token_exchange_url(mut self, url: impl Into<String>) -> Self {
        self.token_exchange_url = Some(url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_keyring_service(mut self, service: impl Into<String>) -> Self {
        self.keyring_service = Some(service.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

/// Visibility of a remote resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// Minimum poll interval (prevents runaway syncing)
const MIN_POLL_INTERVAL_SECS: u64 = 30;

/// Timing of the automatic sync triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Quiet period after the last local change before syncing, in milliseconds
    pub debounce_ms: u64,
    /// Poll interval while the app is visible, in seconds
    pub poll_interval_secs: u64,
    /// Poll interval while the app is hidden, in seconds
    pub hidden_poll_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            poll_interval_secs: 300,
            hidden_poll_interval_secs: 900,
        }
    }
}

impl SchedulerSettings {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_poll_intervals(mut self, visible: Duration, hidden: Duration) -> Self {
        self.poll_interval_secs = visible.as_secs();
        self.hidden_poll_interval_secs = hidden.as_secs();
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Poll interval for the current visibility; hidden never polls faster
    /// than visible
    pub fn poll_interval(&self, visible: bool) -> Duration {
        let visible_secs = self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS);
        let secs = if visible {
            visible_secs
        } else {
            self.hidden_poll_interval_secs.max(visible_secs)
        };
        Duration::from_secs(secs)
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub sync: SyncSettings,
    pub scheduler: SchedulerSettings,
}

impl ConfigFile {
    /// Load from file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, data)
    }
}

/// Phase of a sync run in which a domain failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Provision,
    Download,
    Upload,
}

/// Result for a single domain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SyncPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            phase: None,
            error: None,
        }
    }

    pub fn failed(phase: SyncPhase, error: &SyncError) -> Self {
        Self {
            success: false,
            phase: Some(phase),
            error: Some(error.to_string()),
        }
    }
}

/// Per-domain report produced by every sync-level operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// Whether every domain succeeded
    pub success: bool,
    /// The run was dropped because another one was in flight
    #[serde(default)]
    pub skipped: bool,
    pub domains: BTreeMap<Domain, DomainOutcome>,
    /// Duration of the run in milliseconds
    pub duration_ms: u64,
}

impl SyncOutcome {
    pub fn from_domains(domains: BTreeMap<Domain, DomainOutcome>, duration_ms: u64) -> Self {
        let success = !domains.is_empty() && domains.values().all(|d| d.success);
        Self {
            success,
            skipped: false,
            domains,
            duration_ms,
        }
    }

    /// Every domain failed with the same error in the same phase
    pub fn all_failed(phase: SyncPhase, error: &SyncError) -> Self {
        let domains = Domain::ALL
            .iter()
            .map(|d| (*d, DomainOutcome::failed(phase, error)))
            .collect();
        Self::from_domains(domains, 0)
    }

    pub fn skipped() -> Self {
        Self {
            success: false,
            skipped: true,
            domains: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    pub fn failed_domains(&self) -> Vec<Domain> {
        self.domains
            .iter()
            .filter(|(_, outcome)| !outcome.success)
            .map(|(domain, _)| *domain)
            .collect()
    }

    /// Collapse into a `Result`, mapping any failure to `PartialSyncFailure`
    pub fn into_result(self) -> Result<(), SyncError> {
        if self.skipped {
            return Err(SyncError::SyncInProgress);
        }
        if self.success {
            return Ok(());
        }
        Err(SyncError::PartialSyncFailure {
            failed: self.failed_domains(),
            total: self.domains.len(),
        })
    }
}

/// Outcome of `sync()` together with the merged state, when the merge ran.
///
/// Callers should adopt `merged` even when `outcome.success` is false: the
/// merge already happened, only some remote writes may be stale.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub merged: Option<AppState>,
}

/// Sync status exposed to the surrounding application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Current sync state
    pub status: SyncState,
    /// Last overall-successful sync
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Error message if status is Error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Domains that failed in the last run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_domains: Vec<Domain>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            status: SyncState::Disabled,
            last_sync: None,
            error: None,
            failed_domains: Vec::new(),
        }
    }
}

/// Current sync state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No token stored
    Disabled,
    /// Ready to sync
    Idle,
    /// Currently syncing
    Syncing,
    /// Last sync succeeded
    Success,
    /// Last sync failed for at least one domain
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success_requires_every_domain() {
        let mut domains = BTreeMap::new();
        domains.insert(Domain::Todos, DomainOutcome::ok());
        domains.insert(
            Domain::Trackers,
            DomainOutcome::failed(SyncPhase::Download, &SyncError::NotProvisioned(Domain::Trackers)),
        );

        let outcome = SyncOutcome::from_domains(domains, 12);
        assert!(!outcome.success);
        assert_eq!(outcome.failed_domains(), vec![Domain::Trackers]);
        assert!(matches!(
            outcome.into_result(),
            Err(SyncError::PartialSyncFailure { total: 2, .. })
        ));

        assert!(!SyncOutcome::from_domains(BTreeMap::new(), 0).success);
    }

    #[test]
    fn test_outcome_serializes_domain_keys() {
        let outcome = SyncOutcome::all_failed(SyncPhase::Provision, &SyncError::NotAuthenticated);
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["domains"]["todos"]["phase"], "provision");
        assert_eq!(json["domains"]["metadata"]["error"], "Not authenticated");
    }

    #[test]
    fn test_config_file_defaults_and_overrides() {
        let config: ConfigFile = toml::from_str(
            r#"
            [sync]
            api_base_url = "https://docs.example.com"
            request_timeout_secs = 5

            [scheduler]
            debounce_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.api_base_url, "https://docs.example.com");
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync.visibility, Visibility::Private);
        assert_eq!(config.scheduler.debounce(), Duration::from_millis(500));
        assert_eq!(config.scheduler.poll_interval(true), Duration::from_secs(300));
    }

    #[test]
    fn test_hidden_poll_interval_is_never_shorter() {
        let settings = SchedulerSettings::default()
            .with_poll_intervals(Duration::from_secs(600), Duration::from_secs(60));
        assert_eq!(settings.poll_interval(false), Duration::from_secs(600));

        let settings = SchedulerSettings::default()
            .with_poll_intervals(Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(settings.poll_interval(true), Duration::from_secs(MIN_POLL_INTERVAL_SECS));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ConfigFile::default();
        config.sync = SyncSettings::new("https://docs.example.com")
            .with_token_exchange_url("https://auth.example.com/exchange");
        config.save(&path).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.sync.api_base_url, "https://docs.example.com");
        assert_eq!(
            loaded.sync.token_exchange_url.as_deref(),
            Some("https://auth.example.com/exchange")
        );
    }
}
