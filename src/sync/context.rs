//! Injectable bundle of everything a sync component needs.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;

use super::config::SyncSettings;
use super::credentials::CredentialStore;
use super::error::SyncError;
use super::registry::Domain;
use super::remote::{DocumentApi, RemoteError};

/// Remote API handle, credential store and settings, shared by the
/// provisioner, the domain client, diagnostics and the manager.
///
/// Owned by the caller and passed in explicitly; constructing a fresh context
/// per test keeps tests isolated from each other.
#[derive(Clone)]
pub struct SyncContext {
    api: Arc<dyn DocumentApi>,
    credentials: Arc<CredentialStore>,
    settings: Arc<SyncSettings>,
    request_timeout: Duration,
}

impl SyncContext {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        credentials: Arc<CredentialStore>,
        settings: SyncSettings,
    ) -> Self {
        let request_timeout = settings.request_timeout();
        Self {
            api,
            credentials,
            settings: Arc::new(settings),
            request_timeout,
        }
    }

    /// Override the per-call timeout (sub-second values are allowed here)
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn api(&self) -> &dyn DocumentApi {
        self.api.as_ref()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Await a remote call, failing with `Timeout` instead of hanging
    pub async fn call<T, F>(&self, request: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.request_timeout)),
        }
    }
}

/// Run a domain-scoped operation, turning a panic into an `Internal` error
/// for that domain so sibling domains keep going
pub async fn guarded<T, F>(domain: Domain, operation: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            log::error!("Sync: {} operation panicked: {}", domain, message);
            Err(SyncError::Internal { domain, message })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
