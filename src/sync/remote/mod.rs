//! Remote document API: wire types, the `DocumentApi` seam and its backends.

mod client;
mod memory;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::Visibility;
use super::payload::DomainPayload;
use super::registry::ResourceDescriptor;

pub use client::HttpDocumentClient;
pub use memory::{CallCounts, MemoryDocumentApi};

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Token exchange rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            RemoteError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Copy of this error for reporting against several domains at once.
    /// Transport errors keep their status code and message.
    pub fn duplicate(&self) -> Self {
        match self {
            RemoteError::Status { status, body } => RemoteError::Status {
                status: *status,
                body: body.clone(),
            },
            RemoteError::Http(e) => match e.status() {
                Some(status) => RemoteError::Status {
                    status: status.as_u16(),
                    body: e.to_string(),
                },
                None => RemoteError::Unavailable(e.to_string()),
            },
            RemoteError::Decode(e) => RemoteError::Unavailable(format!("invalid response: {}", e)),
            RemoteError::Timeout(after) => RemoteError::Timeout(*after),
            RemoteError::Unavailable(msg) => RemoteError::Unavailable(msg.clone()),
            RemoteError::InvalidUrl(msg) => RemoteError::InvalidUrl(msg.clone()),
            RemoteError::Rejected(msg) => RemoteError::Rejected(msg.clone()),
        }
    }
}

/// A file inside a remote resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteFile {
    /// File body; absent when the server truncated or omitted it
    #[serde(default)]
    pub content: Option<String>,
}

impl RemoteFile {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// Body of a create (`POST /resources`) or update (`PATCH /resources/{id}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceWrite {
    pub label: String,
    /// Only sent on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    pub files: BTreeMap<String, RemoteFile>,
}

impl ResourceWrite {
    /// Create body seeding a domain's resource with `payload`
    pub fn create(
        descriptor: &ResourceDescriptor,
        payload: &DomainPayload,
        visibility: Visibility,
    ) -> Result<Self, serde_json::Error> {
        let mut write = Self::update(descriptor, payload)?;
        write.visibility = Some(visibility);
        Ok(write)
    }

    /// Update body replacing the domain file with `payload`
    pub fn update(
        descriptor: &ResourceDescriptor,
        payload: &DomainPayload,
    ) -> Result<Self, serde_json::Error> {
        let mut files = BTreeMap::new();
        files.insert(
            descriptor.filename.to_string(),
            RemoteFile::new(payload.to_json()?),
        );
        Ok(Self {
            label: descriptor.label.to_string(),
            visibility: None,
            files,
        })
    }
}

/// A resource as returned by read, create, update and list calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResource {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub files: BTreeMap<String, RemoteFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Identity behind a bearer token (`GET /user`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteUser {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The generic create/read/update document API the engine syncs against.
///
/// Implementations never check for a missing token themselves; callers
/// short-circuit with `NotAuthenticated` before reaching this layer.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn create_resource(
        &self,
        token: &str,
        body: &ResourceWrite,
    ) -> Result<RemoteResource, RemoteError>;

    async fn update_resource(
        &self,
        token: &str,
        id: &str,
        body: &ResourceWrite,
    ) -> Result<RemoteResource, RemoteError>;

    async fn read_resource(&self, token: &str, id: &str) -> Result<RemoteResource, RemoteError>;

    async fn list_resources(&self, token: &str) -> Result<Vec<RemoteResource>, RemoteError>;

    async fn current_user(&self, token: &str) -> Result<RemoteUser, RemoteError>;

    /// Exchange an OAuth authorization code for a bearer token
    async fn exchange_code(&self, code: &str) -> Result<String, RemoteError>;
}
