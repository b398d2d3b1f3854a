use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{DocumentApi, RemoteError, RemoteFile, RemoteResource, RemoteUser, ResourceWrite};

/// Number of calls received per endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub update: usize,
    pub read: usize,
    pub list: usize,
    pub user: usize,
    pub exchange: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.create + self.update + self.read + self.list + self.user + self.exchange
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<String, RemoteResource>,
    /// Tokens accepted by the API; empty means any non-empty token
    tokens: HashMap<String, RemoteUser>,
    codes: HashMap<String, String>,
    calls: CallCounts,
    offline: bool,
    failing_creates: HashSet<String>,
    hanging_reads: HashSet<String>,
}

/// In-process document API.
///
/// Behaves like the HTTP API (404 for unknown ids, 401 for unknown tokens)
/// and records call counts. Faults can be injected per label or id, which
/// makes it the transport for tests and for offline dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocumentApi {
    state: Mutex<MemoryState>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryDocumentApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept `token`, identifying as `login`
    pub fn with_user(self, token: &str, login: &str) -> Self {
        self.state.lock().unwrap().tokens.insert(
            token.to_string(),
            RemoteUser {
                login: login.to_string(),
                name: None,
            },
        );
        self
    }

    /// Accept `code` at the token exchange, yielding `token`
    pub fn with_code(self, code: &str, token: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .codes
            .insert(code.to_string(), token.to_string());
        self
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Fail every call as if the network were down
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Make resource creation fail for `label`
    pub fn fail_creates_for(&self, label: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_creates
            .insert(label.to_string());
    }

    /// Make reads of resource `id` never complete
    pub fn hang_reads_for(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .hanging_reads
            .insert(id.to_string());
    }

    /// Store a resource directly, bypassing counters; returns its id
    pub fn insert_resource(&self, label: &str, filename: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let mut files = BTreeMap::new();
        files.insert(filename.to_string(), RemoteFile::new(content));
        self.state.lock().unwrap().resources.insert(
            id.clone(),
            RemoteResource {
                id: id.clone(),
                label: label.to_string(),
                files,
                updated_at: Some(Utc::now()),
            },
        );
        id
    }

    pub fn remove_resource(&self, id: &str) -> Option<RemoteResource> {
        self.state.lock().unwrap().resources.remove(id)
    }

    pub fn resource(&self, id: &str) -> Option<RemoteResource> {
        self.state.lock().unwrap().resources.get(id).cloned()
    }

    pub fn resources(&self) -> Vec<RemoteResource> {
        self.state.lock().unwrap().resources.values().cloned().collect()
    }

    /// Content of `filename` in resource `id`
    pub fn file_content(&self, id: &str, filename: &str) -> Option<String> {
        self.resource(id)
            .and_then(|r| r.files.get(filename).cloned())
            .and_then(|f| f.content)
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls = CallCounts::default();
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check(state: &MemoryState, token: &str) -> Result<(), RemoteError> {
        if state.offline {
            return Err(RemoteError::Unavailable("network unreachable".to_string()));
        }
        let known = if state.tokens.is_empty() {
            !token.is_empty()
        } else {
            state.tokens.contains_key(token)
        };
        if !known {
            return Err(RemoteError::Status {
                status: 401,
                body: "Bad credentials".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(id: &str) -> RemoteError {
        RemoteError::Status {
            status: 404,
            body: format!("resource {} not found", id),
        }
    }
}

#[async_trait]
impl DocumentApi for MemoryDocumentApi {
    async fn create_resource(
        &self,
        token: &str,
        body: &ResourceWrite,
    ) -> Result<RemoteResource, RemoteError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.create += 1;
        Self::check(&state, token)?;

        if state.failing_creates.contains(&body.label) {
            return Err(RemoteError::Status {
                status: 422,
                body: "Validation Failed".to_string(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let resource = RemoteResource {
            id: id.clone(),
            label: body.label.clone(),
            files: body.files.clone(),
            updated_at: Some(Utc::now()),
        };
        state.resources.insert(id, resource.clone());
        Ok(resource)
    }

    async fn update_resource(
        &self,
        token: &str,
        id: &str,
        body: &ResourceWrite,
    ) -> Result<RemoteResource, RemoteError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.update += 1;
        Self::check(&state, token)?;

        let resource = state
            .resources
            .get_mut(id)
            .ok_or_else(|| Self::not_found(id))?;
        resource.label = body.label.clone();
        for (name, file) in &body.files {
            resource.files.insert(name.clone(), file.clone());
        }
        resource.updated_at = Some(Utc::now());
        Ok(resource.clone())
    }

    async fn read_resource(&self, token: &str, id: &str) -> Result<RemoteResource, RemoteError> {
        self.delay().await;
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.calls.read += 1;
            Self::check(&state, token)?;
            state.hanging_reads.contains(id)
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let state = self.state.lock().unwrap();
        state
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn list_resources(&self, token: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.list += 1;
        Self::check(&state, token)?;

        // Listings carry metadata only, like the HTTP API
        Ok(state
            .resources
            .values()
            .map(|r| RemoteResource {
                files: BTreeMap::new(),
                ..r.clone()
            })
            .collect())
    }

    async fn current_user(&self, token: &str) -> Result<RemoteUser, RemoteError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.user += 1;
        Self::check(&state, token)?;

        Ok(state.tokens.get(token).cloned().unwrap_or_else(|| RemoteUser {
            login: "local".to_string(),
            name: None,
        }))
    }

    async fn exchange_code(&self, code: &str) -> Result<String, RemoteError> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.calls.exchange += 1;
        if state.offline {
            return Err(RemoteError::Unavailable("network unreachable".to_string()));
        }
        state
            .codes
            .get(code)
            .cloned()
            .ok_or_else(|| RemoteError::Rejected("bad_verification_code".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(label: &str, content: &str) -> ResourceWrite {
        let mut files = BTreeMap::new();
        files.insert("todos.json".to_string(), RemoteFile::new(content));
        ResourceWrite {
            label: label.to_string(),
            visibility: None,
            files,
        }
    }

    #[tokio::test]
    async fn test_create_read_update() {
        let api = MemoryDocumentApi::new();
        let created = api.create_resource("t", &write("todos", "{}")).await.unwrap();

        api.update_resource("t", &created.id, &write("todos", r#"{"todos":[]}"#))
            .await
            .unwrap();
        let read = api.read_resource("t", &created.id).await.unwrap();

        assert_eq!(read.files["todos.json"].content.as_deref(), Some(r#"{"todos":[]}"#));
        assert_eq!(
            api.calls(),
            CallCounts {
                create: 1,
                update: 1,
                read: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_id_and_token() {
        let api = MemoryDocumentApi::new().with_user("good", "octo");

        let err = api.read_resource("good", "missing").await.unwrap_err();
        assert!(err.is_not_found());

        let err = api.list_resources("bad").await.unwrap_err();
        assert!(err.is_auth_failure());

        assert_eq!(api.current_user("good").await.unwrap().login, "octo");
    }

    #[tokio::test]
    async fn test_offline_and_failing_creates() {
        let api = MemoryDocumentApi::new();
        api.fail_creates_for("todos");
        assert_eq!(
            api.create_resource("t", &write("todos", "{}")).await.unwrap_err().status(),
            Some(422)
        );

        api.set_offline(true);
        assert!(matches!(
            api.list_resources("t").await,
            Err(RemoteError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_listing_omits_file_content() {
        let api = MemoryDocumentApi::new();
        let id = api.insert_resource("todos", "todos.json", "{}");

        let listed = api.list_resources("t").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert!(listed[0].files.is_empty());
    }
}
