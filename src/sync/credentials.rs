use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::error::SyncError;
use super::registry::{describe, Domain};
use crate::storage::{KeyValueStore, StorageError};

const TOKEN_KEY: &str = "docsync.token";
const LAST_SYNC_KEY: &str = "docsync.last_sync";
const KEYRING_USER: &str = "bearer-token";

#[derive(Debug, Default, Clone)]
struct CachedCredentials {
    token: Option<String>,
    resource_ids: BTreeMap<Domain, String>,
    last_sync: Option<DateTime<Utc>>,
}

/// Bearer token, per-domain resource ids and last sync time.
///
/// Reads are served from an in-memory cache filled at construction. Every
/// write reaches the backing store before the cache is updated, so the cache
/// never holds a value that would be lost on restart.
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    cache: RwLock<CachedCredentials>,
    keyring_service: Option<String>,
}

impl CredentialStore {
    /// Load credentials from `store`
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        Self::load_with_keyring(store, None)
    }

    /// Load credentials, mirroring the token into the OS keyring under
    /// `keyring_service` when set
    pub fn load_with_keyring(
        store: Arc<dyn KeyValueStore>,
        keyring_service: Option<String>,
    ) -> Result<Self, StorageError> {
        let mut cache = CachedCredentials {
            token: store.get(TOKEN_KEY)?,
            ..Default::default()
        };

        if cache.token.is_none() {
            if let Some(service) = &keyring_service {
                cache.token = read_keyring(service);
            }
        }

        for domain in Domain::ALL {
            if let Some(id) = store.get(describe(domain).storage_key)? {
                cache.resource_ids.insert(domain, id);
            }
        }

        cache.last_sync = store
            .get(LAST_SYNC_KEY)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Self {
            store,
            cache: RwLock::new(cache),
            keyring_service,
        })
    }

    pub fn token(&self) -> Option<String> {
        self.cache.read().unwrap().token.clone()
    }

    /// The stored token, or `NotAuthenticated`
    pub fn require_token(&self) -> Result<String, SyncError> {
        self.token().ok_or(SyncError::NotAuthenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        self.cache.read().unwrap().token.is_some()
    }

    pub fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.store.set(TOKEN_KEY, token)?;
        if let Some(service) = &self.keyring_service {
            write_keyring(service, token);
        }
        self.cache.write().unwrap().token = Some(token.to_string());
        Ok(())
    }

    pub fn resource_id(&self, domain: Domain) -> Option<String> {
        self.cache.read().unwrap().resource_ids.get(&domain).cloned()
    }

    pub fn set_resource_id(&self, domain: Domain, id: &str) -> Result<(), StorageError> {
        self.store.set(describe(domain).storage_key, id)?;
        self.cache
            .write()
            .unwrap()
            .resource_ids
            .insert(domain, id.to_string());
        Ok(())
    }

    /// Every known domain → resource id
    pub fn resource_ids(&self) -> BTreeMap<Domain, String> {
        self.cache.read().unwrap().resource_ids.clone()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.cache.read().unwrap().last_sync
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.store.set(LAST_SYNC_KEY, &at.to_rfc3339())?;
        self.cache.write().unwrap().last_sync = Some(at);
        Ok(())
    }

    /// Remove the token, every domain's resource id and the last sync time
    pub fn clear_all(&self) -> Result<(), StorageError> {
        let mut cache = self.cache.write().unwrap();

        self.store.delete(TOKEN_KEY)?;
        cache.token = None;

        for domain in Domain::ALL {
            self.store.delete(describe(domain).storage_key)?;
            cache.resource_ids.remove(&domain);
        }

        self.store.delete(LAST_SYNC_KEY)?;
        cache.last_sync = None;

        if let Some(service) = &self.keyring_service {
            delete_keyring(service);
        }

        log::info!("Credentials cleared");
        Ok(())
    }
}

fn read_keyring(service: &str) -> Option<String> {
    let entry = keyring::Entry::new(service, KEYRING_USER).ok()?;
    match entry.get_password() {
        Ok(token) => Some(token),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!("Keyring read failed for {}: {}", service, e);
            None
        }
    }
}

fn write_keyring(service: &str, token: &str) {
    match keyring::Entry::new(service, KEYRING_USER) {
        Ok(entry) => {
            if let Err(e) = entry.set_password(token) {
                log::warn!("Keyring write failed for {}: {}", service, e);
            }
        }
        Err(e) => log::warn!("Keyring unavailable for {}: {}", service, e),
    }
}

fn delete_keyring(service: &str) {
    if let Ok(entry) = keyring::Entry::new(service, KEYRING_USER) {
        let _ = entry.delete_credential();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};

    fn memory_store() -> (Arc<MemoryStore>, CredentialStore) {
        let backing = Arc::new(MemoryStore::new());
        let credentials = CredentialStore::load(backing.clone()).unwrap();
        (backing, credentials)
    }

    #[test]
    fn test_writes_are_persisted_immediately() {
        let (backing, credentials) = memory_store();
        credentials.set_token("tok").unwrap();
        credentials.set_resource_id(Domain::Todos, "r-todos").unwrap();

        let entries = backing.snapshot();
        assert_eq!(entries.get(TOKEN_KEY).map(String::as_str), Some("tok"));
        assert_eq!(
            entries.get("docsync.resource.todos").map(String::as_str),
            Some("r-todos")
        );
    }

    #[test]
    fn test_clear_all_removes_everything() {
        let (backing, credentials) = memory_store();
        credentials.set_token("tok").unwrap();
        for domain in Domain::ALL {
            credentials
                .set_resource_id(domain, &format!("id-{}", domain))
                .unwrap();
        }
        credentials.set_last_sync(Utc::now()).unwrap();

        credentials.clear_all().unwrap();

        assert!(credentials.token().is_none());
        assert!(credentials.resource_ids().is_empty());
        assert!(credentials.last_sync().is_none());
        assert!(backing.snapshot().is_empty());

        // Nothing comes back from the persisted store either
        let reloaded = CredentialStore::load(backing).unwrap();
        assert!(!reloaded.is_authenticated());
        assert!(reloaded.resource_ids().is_empty());
    }

    #[test]
    fn test_cache_is_populated_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        let synced_at = Utc::now();

        {
            let store = Arc::new(FileStore::open(path.clone()).unwrap());
            let credentials = CredentialStore::load(store).unwrap();
            credentials.set_token("tok").unwrap();
            credentials.set_resource_id(Domain::Analytics, "r-a").unwrap();
            credentials.set_last_sync(synced_at).unwrap();
        }

        let store = Arc::new(FileStore::open(path).unwrap());
        let credentials = CredentialStore::load(store).unwrap();
        assert_eq!(credentials.token().as_deref(), Some("tok"));
        assert_eq!(credentials.resource_id(Domain::Analytics).as_deref(), Some("r-a"));
        assert_eq!(credentials.resource_id(Domain::Todos), None);
        assert_eq!(
            credentials.last_sync().map(|t| t.timestamp_millis()),
            Some(synced_at.timestamp_millis())
        );
    }

    #[test]
    fn test_require_token() {
        let (_, credentials) = memory_store();
        assert!(matches!(
            credentials.require_token(),
            Err(SyncError::NotAuthenticated)
        ));
        credentials.set_token("tok").unwrap();
        assert_eq!(credentials.require_token().unwrap(), "tok");
    }
}
