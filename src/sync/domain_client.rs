use super::context::SyncContext;
use super::error::SyncError;
use super::payload::DomainPayload;
use super::provisioner::{Provisioned, ResourceProvisioner};
use super::registry::{describe, Domain};
use super::remote::ResourceWrite;

/// Reads and writes the payload of a single domain.
///
/// `upload` and `download` provision on demand; the `_existing` variants
/// require a known resource id and fail with `NotProvisioned` otherwise.
pub struct DomainSyncClient {
    ctx: SyncContext,
    provisioner: ResourceProvisioner,
}

impl DomainSyncClient {
    pub fn new(ctx: SyncContext) -> Self {
        let provisioner = ResourceProvisioner::new(ctx.clone());
        Self { ctx, provisioner }
    }

    /// Write `payload` to its domain's resource
    pub async fn upload(&self, payload: &DomainPayload) -> Result<(), SyncError> {
        let token = self.ctx.credentials().require_token()?;

        // A freshly created resource already holds the payload
        match self.provisioner.ensure_with(payload).await? {
            Provisioned::Created(_) => Ok(()),
            provisioned => self.write(&token, provisioned.id(), payload).await,
        }
    }

    pub async fn upload_existing(&self, payload: &DomainPayload) -> Result<(), SyncError> {
        let token = self.ctx.credentials().require_token()?;
        let id = self.known_id(payload.domain())?;
        self.write(&token, &id, payload).await
    }

    /// Read the payload of `domain`. An unprovisioned domain is provisioned
    /// and its default payload returned.
    pub async fn download(&self, domain: Domain) -> Result<DomainPayload, SyncError> {
        let token = self.ctx.credentials().require_token()?;
        let seed = DomainPayload::default_for(domain);

        match self.provisioner.ensure_with(&seed).await? {
            Provisioned::Created(_) => Ok(seed),
            provisioned => self.read(&token, domain, provisioned.id()).await,
        }
    }

    pub async fn download_existing(&self, domain: Domain) -> Result<DomainPayload, SyncError> {
        let token = self.ctx.credentials().require_token()?;
        let id = self.known_id(domain)?;
        self.read(&token, domain, &id).await
    }

    fn known_id(&self, domain: Domain) -> Result<String, SyncError> {
        self.ctx
            .credentials()
            .resource_id(domain)
            .ok_or(SyncError::NotProvisioned(domain))
    }

    async fn write(&self, token: &str, id: &str, payload: &DomainPayload) -> Result<(), SyncError> {
        let domain = payload.domain();
        let body = ResourceWrite::update(describe(domain), payload)?;

        self.ctx
            .call(self.ctx.api().update_resource(token, id, &body))
            .await
            .map_err(|source| SyncError::ResourceUnreachable { domain, source })?;

        log::debug!("Uploaded {} to resource {}", domain, id);
        Ok(())
    }

    async fn read(&self, token: &str, domain: Domain, id: &str) -> Result<DomainPayload, SyncError> {
        let resource = self
            .ctx
            .call(self.ctx.api().read_resource(token, id))
            .await
            .map_err(|source| SyncError::ResourceUnreachable { domain, source })?;

        let filename = describe(domain).filename;
        let content = resource
            .files
            .get(filename)
            .and_then(|file| file.content.as_deref())
            .ok_or_else(|| SyncError::PayloadParse {
                domain,
                reason: format!("resource {} has no {}", id, filename),
            })?;

        DomainPayload::from_json(domain, content).map_err(|e| SyncError::PayloadParse {
            domain,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::sync::payload::{IdRecord, TodosPayload, TrackersPayload};
    use crate::sync::remote::MemoryDocumentApi;
    use crate::sync::testing::{anonymous_context, signed_in_context};

    fn todos(ids: &[&str]) -> DomainPayload {
        let mut payload = TodosPayload::default();
        payload.todos = ids.iter().map(|id| IdRecord::new(*id)).collect();
        DomainPayload::Todos(payload)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let api = Arc::new(MemoryDocumentApi::new());
        let client = DomainSyncClient::new(signed_in_context(&api));

        let mut trackers = TrackersPayload::default();
        trackers
            .trackers
            .insert("water".to_string(), json!({"name": "Water", "goal": 8}));
        let payload = DomainPayload::Trackers(trackers);

        client.upload(&payload).await.unwrap();
        assert_eq!(client.download(Domain::Trackers).await.unwrap(), payload);

        client.upload(&todos(&["a", "b"])).await.unwrap();
        client.upload(&todos(&["c"])).await.unwrap();
        assert_eq!(client.download(Domain::Todos).await.unwrap(), todos(&["c"]));
    }

    #[tokio::test]
    async fn test_first_upload_seeds_with_payload() {
        let api = Arc::new(MemoryDocumentApi::new());
        let ctx = signed_in_context(&api);
        let client = DomainSyncClient::new(ctx.clone());

        client.upload(&todos(&["1"])).await.unwrap();

        assert_eq!(api.calls().create, 1);
        assert_eq!(api.calls().update, 0);
        let id = ctx.credentials().resource_id(Domain::Todos).unwrap();
        let content = api.file_content(&id, "todos.json").unwrap();
        assert_eq!(DomainPayload::from_json(Domain::Todos, &content).unwrap(), todos(&["1"]));
    }

    #[tokio::test]
    async fn test_first_download_returns_default() {
        let api = Arc::new(MemoryDocumentApi::new());
        let client = DomainSyncClient::new(signed_in_context(&api));

        let payload = client.download(Domain::Analytics).await.unwrap();

        assert_eq!(payload, DomainPayload::default_for(Domain::Analytics));
        assert_eq!(api.calls().create, 1);
        assert_eq!(api.calls().read, 0);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_file_is_a_parse_error() {
        let api = Arc::new(MemoryDocumentApi::new());
        let ctx = signed_in_context(&api);
        let client = DomainSyncClient::new(ctx.clone());

        let wrong_file = api.insert_resource("docsync: todos", "notes.txt", "hello");
        ctx.credentials().set_resource_id(Domain::Todos, &wrong_file).unwrap();
        assert!(matches!(
            client.download_existing(Domain::Todos).await,
            Err(SyncError::PayloadParse { domain: Domain::Todos, .. })
        ));

        let garbage = api.insert_resource("docsync: todos", "todos.json", "{not json");
        ctx.credentials().set_resource_id(Domain::Todos, &garbage).unwrap();
        assert!(matches!(
            client.download_existing(Domain::Todos).await,
            Err(SyncError::PayloadParse { domain: Domain::Todos, .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_id_is_unreachable() {
        let api = Arc::new(MemoryDocumentApi::new());
        let ctx = signed_in_context(&api);
        ctx.credentials().set_resource_id(Domain::Todos, "deleted").unwrap();
        let client = DomainSyncClient::new(ctx);

        let err = client.download(Domain::Todos).await.unwrap_err();
        match err {
            SyncError::ResourceUnreachable { domain, source } => {
                assert_eq!(domain, Domain::Todos);
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_strict_variants_never_provision() {
        let api = Arc::new(MemoryDocumentApi::new());
        let client = DomainSyncClient::new(signed_in_context(&api));

        assert!(matches!(
            client.download_existing(Domain::Challenges).await,
            Err(SyncError::NotProvisioned(Domain::Challenges))
        ));
        assert!(matches!(
            client.upload_existing(&todos(&["1"])).await,
            Err(SyncError::NotProvisioned(Domain::Todos))
        ));
        assert_eq!(api.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_makes_no_request() {
        let api = Arc::new(MemoryDocumentApi::new());
        let client = DomainSyncClient::new(anonymous_context(&api));

        assert!(matches!(
            client.upload(&todos(&["1"])).await,
            Err(SyncError::NotAuthenticated)
        ));
        assert!(matches!(
            client.download(Domain::Todos).await,
            Err(SyncError::NotAuthenticated)
        ));
        assert_eq!(api.calls().total(), 0);
    }
}
