use thiserror::Error;

use super::registry::Domain;
use super::remote::RemoteError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Failed to create resource for {domain}: {source}")]
    ResourceCreationFailed {
        domain: Domain,
        #[source]
        source: RemoteError,
    },
    #[error("Resource for {domain} unreachable: {source}")]
    ResourceUnreachable {
        domain: Domain,
        #[source]
        source: RemoteError,
    },
    #[error("Payload for {domain} could not be read: {reason}")]
    PayloadParse { domain: Domain, reason: String },
    #[error("No resource provisioned for {0}")]
    NotProvisioned(Domain),
    #[error("{} of {total} domains failed to sync ({})", .failed.len(), join_domains(.failed))]
    PartialSyncFailure { failed: Vec<Domain>, total: usize },
    #[error("Authentication failed: {0}")]
    Authentication(#[source] RemoteError),
    #[error("A sync is already in progress")]
    SyncInProgress,
    #[error("Unexpected failure in {domain}: {message}")]
    Internal { domain: Domain, message: String },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Domain the failure originated from, when it is domain-scoped
    pub fn domain(&self) -> Option<Domain> {
        match self {
            SyncError::ResourceCreationFailed { domain, .. }
            | SyncError::ResourceUnreachable { domain, .. }
            | SyncError::PayloadParse { domain, .. }
            | SyncError::Internal { domain, .. } => Some(*domain),
            SyncError::NotProvisioned(domain) => Some(*domain),
            _ => None,
        }
    }

    /// Whether the remote rejected our credentials
    pub fn is_auth_failure(&self) -> bool {
        match self {
            SyncError::NotAuthenticated => true,
            SyncError::Authentication(_) => true,
            SyncError::ResourceCreationFailed { source, .. }
            | SyncError::ResourceUnreachable { source, .. } => source.is_auth_failure(),
            _ => false,
        }
    }
}

fn join_domains(domains: &[Domain]) -> String {
    domains
        .iter()
        .map(|d| d.key())
        .collect::<Vec<_>>()
        .join(", ")
}
