use std::collections::BTreeMap;

use futures_util::future::join_all;

use super::context::{guarded, SyncContext};
use super::error::SyncError;
use super::payload::DomainPayload;
use super::registry::{describe, Domain};
use super::remote::{RemoteResource, ResourceWrite};

/// How a domain's resource id was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// Already known locally, no request made
    Cached(String),
    /// Found remotely by label
    Adopted(String),
    /// Freshly created and seeded
    Created(String),
}

impl Provisioned {
    pub fn id(&self) -> &str {
        match self {
            Provisioned::Cached(id) | Provisioned::Adopted(id) | Provisioned::Created(id) => id,
        }
    }

    pub fn into_id(self) -> String {
        match self {
            Provisioned::Cached(id) | Provisioned::Adopted(id) | Provisioned::Created(id) => id,
        }
    }
}

/// Per-domain result of `ensure_all`
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub results: BTreeMap<Domain, Result<String, SyncError>>,
}

impl ProvisionReport {
    pub fn id(&self, domain: Domain) -> Option<&str> {
        match self.results.get(&domain) {
            Some(Ok(id)) => Some(id),
            _ => None,
        }
    }

    /// Domains that have a usable resource id
    pub fn provisioned(&self) -> Vec<Domain> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(d, _)| *d)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.values().all(|r| r.is_ok())
    }
}

/// Makes sure every domain has a remote resource and remembers its id
pub struct ResourceProvisioner {
    ctx: SyncContext,
}

impl ResourceProvisioner {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Resource id for `domain`, provisioning with the default payload
    pub async fn ensure(&self, domain: Domain) -> Result<String, SyncError> {
        self.ensure_with(&DomainPayload::default_for(domain))
            .await
            .map(Provisioned::into_id)
    }

    /// Like `ensure`, seeding a newly created resource with `payload`
    pub async fn ensure_with(&self, payload: &DomainPayload) -> Result<Provisioned, SyncError> {
        let domain = payload.domain();
        if let Some(id) = self.ctx.credentials().resource_id(domain) {
            return Ok(Provisioned::Cached(id));
        }

        let token = self.ctx.credentials().require_token()?;
        let listing = self
            .ctx
            .call(self.ctx.api().list_resources(&token))
            .await
            .map_err(|source| SyncError::ResourceUnreachable { domain, source })?;

        if let Some(id) = self.adopt(domain, &listing)? {
            return Ok(Provisioned::Adopted(id));
        }

        self.create(domain, &token, payload)
            .await
            .map(Provisioned::Created)
    }

    /// Provision every domain that has no id yet.
    ///
    /// One listing is shared by all missing domains and creations run
    /// concurrently. A failing domain never blocks the others.
    pub async fn ensure_all(&self) -> ProvisionReport {
        let mut report = ProvisionReport::default();
        let mut missing = Vec::new();

        for domain in Domain::ALL {
            match self.ctx.credentials().resource_id(domain) {
                Some(id) => {
                    report.results.insert(domain, Ok(id));
                }
                None => missing.push(domain),
            }
        }

        if missing.is_empty() {
            return report;
        }

        let token = match self.ctx.credentials().require_token() {
            Ok(token) => token,
            Err(_) => {
                for domain in missing {
                    report.results.insert(domain, Err(SyncError::NotAuthenticated));
                }
                return report;
            }
        };

        let listing = match self.ctx.call(self.ctx.api().list_resources(&token)).await {
            Ok(listing) => listing,
            Err(e) => {
                log::warn!("Provisioning: listing resources failed: {}", e);
                for domain in missing {
                    report.results.insert(
                        domain,
                        Err(SyncError::ResourceUnreachable {
                            domain,
                            source: e.duplicate(),
                        }),
                    );
                }
                return report;
            }
        };

        let mut to_create = Vec::new();
        for domain in missing {
            match self.adopt(domain, &listing) {
                Ok(Some(id)) => {
                    report.results.insert(domain, Ok(id));
                }
                Ok(None) => to_create.push(domain),
                Err(e) => {
                    report.results.insert(domain, Err(e));
                }
            }
        }

        let created = join_all(to_create.iter().map(|&domain| {
            let token = token.as_str();
            async move {
                let seed = DomainPayload::default_for(domain);
                let result = guarded(domain, self.create(domain, token, &seed)).await;
                (domain, result)
            }
        }))
        .await;

        for (domain, result) in created {
            if let Err(e) = &result {
                log::warn!("Provisioning: {} failed: {}", domain, e);
            }
            report.results.insert(domain, result);
        }

        report
    }

    /// Create a fresh resource for `domain`, replacing any stored id
    pub async fn recreate(&self, domain: Domain) -> Result<String, SyncError> {
        let token = self.ctx.credentials().require_token()?;
        self.create(domain, &token, &DomainPayload::default_for(domain))
            .await
    }

    fn adopt(&self, domain: Domain, listing: &[RemoteResource]) -> Result<Option<String>, SyncError> {
        let label = describe(domain).label;
        let Some(existing) = listing.iter().find(|r| r.label == label) else {
            return Ok(None);
        };

        self.ctx.credentials().set_resource_id(domain, &existing.id)?;
        log::info!("Provisioning: adopted existing resource {} for {}", existing.id, domain);
        Ok(Some(existing.id.clone()))
    }

    async fn create(
        &self,
        domain: Domain,
        token: &str,
        seed: &DomainPayload,
    ) -> Result<String, SyncError> {
        let body = ResourceWrite::create(describe(domain), seed, self.ctx.settings().visibility)?;
        let created = self
            .ctx
            .call(self.ctx.api().create_resource(token, &body))
            .await
            .map_err(|source| SyncError::ResourceCreationFailed { domain, source })?;

        self.ctx.credentials().set_resource_id(domain, &created.id)?;
        log::info!("Provisioning: created resource {} for {}", created.id, domain);
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sync::payload::IdRecord;
    use crate::sync::remote::MemoryDocumentApi;
    use crate::sync::testing::{anonymous_context, signed_in_context};

    #[tokio::test]
    async fn test_ensure_all_is_idempotent() {
        let api = Arc::new(MemoryDocumentApi::new());
        let provisioner = ResourceProvisioner::new(signed_in_context(&api));

        let first = provisioner.ensure_all().await;
        assert!(first.is_complete());
        assert_eq!(api.calls().create, 5);
        assert_eq!(api.calls().list, 1);

        api.reset_calls();
        let second = provisioner.ensure_all().await;
        assert!(second.is_complete());
        assert_eq!(api.calls().total(), 0);
        for domain in Domain::ALL {
            assert_eq!(first.id(domain), second.id(domain));
        }
    }

    #[tokio::test]
    async fn test_default_payload_seeds_new_resources() {
        let api = Arc::new(MemoryDocumentApi::new());
        let provisioner = ResourceProvisioner::new(signed_in_context(&api));

        let id = provisioner.ensure(Domain::Todos).await.unwrap();
        let content = api.file_content(&id, "todos.json").unwrap();
        assert_eq!(
            DomainPayload::from_json(Domain::Todos, &content).unwrap(),
            DomainPayload::default_for(Domain::Todos)
        );
    }

    #[tokio::test]
    async fn test_existing_resource_is_adopted_by_label() {
        let api = Arc::new(MemoryDocumentApi::new());
        let existing = api.insert_resource("docsync: todos", "todos.json", r#"{"todos":[{"id":"9"}]}"#);
        let ctx = signed_in_context(&api);
        let provisioner = ResourceProvisioner::new(ctx.clone());

        let seed = {
            let mut todos = crate::sync::payload::TodosPayload::default();
            todos.todos.push(IdRecord::new("1"));
            DomainPayload::Todos(todos)
        };
        let provisioned = provisioner.ensure_with(&seed).await.unwrap();

        assert_eq!(provisioned, Provisioned::Adopted(existing.clone()));
        assert_eq!(api.calls().create, 0);
        assert_eq!(ctx.credentials().resource_id(Domain::Todos), Some(existing));
    }

    #[tokio::test]
    async fn test_one_failed_creation_does_not_block_others() {
        let api = Arc::new(MemoryDocumentApi::new());
        api.fail_creates_for("docsync: trackers");
        let provisioner = ResourceProvisioner::new(signed_in_context(&api));

        let report = provisioner.ensure_all().await;

        assert!(!report.is_complete());
        assert!(matches!(
            report.results[&Domain::Trackers],
            Err(SyncError::ResourceCreationFailed { domain: Domain::Trackers, .. })
        ));
        assert_eq!(report.provisioned().len(), 4);
    }

    #[tokio::test]
    async fn test_listing_failure_keeps_known_ids() {
        let api = Arc::new(MemoryDocumentApi::new());
        let ctx = signed_in_context(&api);
        ctx.credentials().set_resource_id(Domain::Metadata, "r-meta").unwrap();
        api.set_offline(true);

        let report = ResourceProvisioner::new(ctx).ensure_all().await;

        assert_eq!(report.id(Domain::Metadata), Some("r-meta"));
        assert!(matches!(
            report.results[&Domain::Todos],
            Err(SyncError::ResourceUnreachable { .. })
        ));
        assert_eq!(report.provisioned(), vec![Domain::Metadata]);
    }

    #[tokio::test]
    async fn test_recreate_replaces_stored_id() {
        let api = Arc::new(MemoryDocumentApi::new());
        let ctx = signed_in_context(&api);
        let provisioner = ResourceProvisioner::new(ctx.clone());

        let original = provisioner.ensure(Domain::Analytics).await.unwrap();
        let fresh = provisioner.recreate(Domain::Analytics).await.unwrap();

        assert_ne!(original, fresh);
        assert_eq!(ctx.credentials().resource_id(Domain::Analytics), Some(fresh));
    }

    #[tokio::test]
    async fn test_unauthenticated_makes_no_request() {
        let api = Arc::new(MemoryDocumentApi::new());
        let provisioner = ResourceProvisioner::new(anonymous_context(&api));

        assert!(matches!(
            provisioner.ensure(Domain::Todos).await,
            Err(SyncError::NotAuthenticated)
        ));
        let report = provisioner.ensure_all().await;
        assert!(report.provisioned().is_empty());
        assert_eq!(api.calls().total(), 0);
    }
}
