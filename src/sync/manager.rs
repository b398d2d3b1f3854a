use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;

use super::config::{DomainOutcome, SyncOutcome, SyncPhase, SyncReport, SyncState, SyncStatus};
use super::context::{guarded, SyncContext};
use super::diagnostics::{diagnose, DiagnosticsReport};
use super::domain_client::DomainSyncClient;
use super::error::SyncError;
use super::merge::merge;
use super::payload::{AppState, DomainPayload};
use super::provisioner::ResourceProvisioner;
use super::registry::Domain;
use super::remote::RemoteUser;

/// Releases the in-flight flag when dropped
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Manager for sync operations.
///
/// Full syncs and repairs share one in-flight flag: while one runs, another
/// `sync` returns a skipped outcome and repairs fail with `SyncInProgress`.
pub struct SyncManager {
    ctx: SyncContext,
    provisioner: ResourceProvisioner,
    client: DomainSyncClient,
    in_flight: AtomicBool,
    status: Mutex<SyncStatus>,
}

impl SyncManager {
    /// Create a new sync manager
    pub fn new(ctx: SyncContext) -> Self {
        let status = SyncStatus {
            status: if ctx.credentials().is_authenticated() {
                SyncState::Idle
            } else {
                SyncState::Disabled
            },
            last_sync: ctx.credentials().last_sync(),
            ..Default::default()
        };

        Self {
            provisioner: ResourceProvisioner::new(ctx.clone()),
            client: DomainSyncClient::new(ctx.clone()),
            ctx,
            in_flight: AtomicBool::new(false),
            status: Mutex::new(status),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    fn begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Exchange an OAuth authorization code for a token and store it
    pub async fn authenticate(&self, code: &str) -> Result<RemoteUser, SyncError> {
        let token = self
            .ctx
            .call(self.ctx.api().exchange_code(code))
            .await
            .map_err(SyncError::Authentication)?;
        self.authenticate_with_token(&token).await
    }

    /// Verify `token` against the remote identity endpoint and store it
    pub async fn authenticate_with_token(&self, token: &str) -> Result<RemoteUser, SyncError> {
        let user = self
            .ctx
            .call(self.ctx.api().current_user(token))
            .await
            .map_err(SyncError::Authentication)?;

        self.ctx.credentials().set_token(token)?;
        {
            let mut status = self.status.lock().unwrap();
            status.status = SyncState::Idle;
            status.error = None;
        }

        log::info!("Authenticated as {}", user.login);
        Ok(user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.ctx.credentials().is_authenticated()
    }

    pub async fn current_user(&self) -> Result<RemoteUser, SyncError> {
        let token = self.ctx.credentials().require_token()?;
        self.ctx
            .call(self.ctx.api().current_user(&token))
            .await
            .map_err(SyncError::Authentication)
    }

    /// Forget the token and every resource id
    pub async fn logout(&self) -> Result<(), SyncError> {
        self.reset().await
    }

    /// Provision, download, merge with `local` and upload every domain.
    ///
    /// Returns immediately with a skipped outcome if another sync or repair
    /// is running.
    pub async fn sync(&self, local: &AppState) -> SyncReport {
        let Some(_in_flight) = self.begin() else {
            log::info!("Sync: already in progress, skipping");
            return SyncReport {
                outcome: SyncOutcome::skipped(),
                merged: None,
            };
        };

        self.status.lock().unwrap().status = SyncState::Syncing;
        let report = self.run_sync(local).await;
        self.finish(&report.outcome);
        report
    }

    async fn run_sync(&self, local: &AppState) -> SyncReport {
        let started = Instant::now();
        log::info!("Sync: starting");

        if !self.is_authenticated() {
            log::warn!("Sync: not authenticated");
            return SyncReport {
                outcome: SyncOutcome::all_failed(SyncPhase::Provision, &SyncError::NotAuthenticated),
                merged: None,
            };
        }

        let mut domains = BTreeMap::new();

        let provision = self.provisioner.ensure_all().await;
        for (domain, result) in &provision.results {
            if let Err(e) = result {
                log::warn!("Sync: provisioning {} failed: {}", domain, e);
                domains.insert(*domain, DomainOutcome::failed(SyncPhase::Provision, e));
            }
        }

        let provisioned = provision.provisioned();
        if provisioned.is_empty() {
            log::warn!("Sync: no domain could be provisioned, aborting");
            return SyncReport {
                outcome: SyncOutcome::from_domains(domains, elapsed_ms(started)),
                merged: None,
            };
        }

        let downloads = join_all(provisioned.iter().map(|&domain| async move {
            let result = guarded(domain, self.client.download_existing(domain)).await;
            (domain, result)
        }))
        .await;

        let mut remote_payloads = Vec::new();
        let mut to_upload = Vec::new();
        for (domain, result) in downloads {
            match result {
                Ok(payload) => {
                    remote_payloads.push(payload);
                    to_upload.push(domain);
                }
                Err(e @ SyncError::PayloadParse { .. }) => {
                    // The resource answered with a body we cannot read; the
                    // merged state replaces it
                    log::warn!("Sync: remote {} unreadable, will overwrite: {}", domain, e);
                    domains.insert(domain, DomainOutcome::failed(SyncPhase::Download, &e));
                    to_upload.push(domain);
                }
                Err(e) => {
                    log::warn!("Sync: download of {} failed: {}", domain, e);
                    domains.insert(domain, DomainOutcome::failed(SyncPhase::Download, &e));
                }
            }
        }
        log::info!(
            "Sync: downloaded {} of {} domains",
            remote_payloads.len(),
            provisioned.len()
        );

        // Domains without a readable remote merge against their default payload
        let remote = AppState::from_payloads(remote_payloads);
        let merged = merge(local.clone(), &remote);

        // Domains whose resource could not be reached are held back, so data
        // we never saw is not overwritten
        let uploads = join_all(to_upload.iter().map(|&domain| {
            let payload = merged.payload(domain);
            async move {
                let result = guarded(domain, self.client.upload_existing(&payload)).await;
                (domain, result)
            }
        }))
        .await;

        for (domain, result) in uploads {
            match result {
                Ok(()) => {
                    // A repaired unreadable resource keeps its download failure
                    domains.entry(domain).or_insert_with(DomainOutcome::ok);
                }
                Err(e) => {
                    log::warn!("Sync: upload of {} failed: {}", domain, e);
                    domains.insert(domain, DomainOutcome::failed(SyncPhase::Upload, &e));
                }
            }
        }

        let outcome = SyncOutcome::from_domains(domains, elapsed_ms(started));
        if outcome.success {
            if let Err(e) = self.ctx.credentials().set_last_sync(Utc::now()) {
                log::warn!("Sync: failed to record last sync time: {}", e);
            }
        }

        log::info!(
            "Sync: finished in {}ms, success={}, failed={:?}",
            outcome.duration_ms,
            outcome.success,
            outcome.failed_domains()
        );

        SyncReport {
            outcome,
            merged: Some(merged),
        }
    }

    fn finish(&self, outcome: &SyncOutcome) {
        let mut status = self.status.lock().unwrap();
        status.last_sync = self.ctx.credentials().last_sync();

        if outcome.success {
            status.status = SyncState::Success;
            status.error = None;
            status.failed_domains.clear();
            return;
        }

        status.status = if self.is_authenticated() {
            SyncState::Error
        } else {
            SyncState::Disabled
        };
        status.error = outcome.clone().into_result().err().map(|e| e.to_string());
        status.failed_domains = outcome.failed_domains();
    }

    /// Upload one domain, provisioning its resource if needed
    pub async fn upload_domain(&self, payload: &DomainPayload) -> Result<(), SyncError> {
        self.client.upload(payload).await
    }

    /// Download one domain, provisioning its resource if needed
    pub async fn download_domain(&self, domain: Domain) -> Result<DomainPayload, SyncError> {
        self.client.download(domain).await
    }

    /// Diagnose credentials and resource reachability
    pub async fn status(&self) -> DiagnosticsReport {
        diagnose(&self.ctx).await
    }

    /// Create a fresh resource for every domain, discarding the stored ids.
    ///
    /// Destructive: remote data in the old resources is no longer synced.
    pub async fn force_recreate_all(&self) -> SyncOutcome {
        let Some(_in_flight) = self.begin() else {
            return SyncOutcome::skipped();
        };

        if !self.is_authenticated() {
            return SyncOutcome::all_failed(SyncPhase::Provision, &SyncError::NotAuthenticated);
        }

        let started = Instant::now();
        log::warn!("Repair: recreating every domain resource");

        let results = join_all(Domain::ALL.iter().map(|&domain| async move {
            let result = guarded(domain, self.provisioner.recreate(domain)).await;
            (domain, result)
        }))
        .await;

        let domains = results
            .into_iter()
            .map(|(domain, result)| match result {
                Ok(id) => {
                    log::info!("Repair: {} now uses resource {}", domain, id);
                    (domain, DomainOutcome::ok())
                }
                Err(e) => {
                    log::warn!("Repair: recreating {} failed: {}", domain, e);
                    (domain, DomainOutcome::failed(SyncPhase::Provision, &e))
                }
            })
            .collect();

        SyncOutcome::from_domains(domains, elapsed_ms(started))
    }

    /// Clear every stored credential
    pub async fn reset(&self) -> Result<(), SyncError> {
        let Some(_in_flight) = self.begin() else {
            return Err(SyncError::SyncInProgress);
        };

        self.ctx.credentials().clear_all()?;
        *self.status.lock().unwrap() = SyncStatus::default();
        log::info!("Sync credentials reset");
        Ok(())
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.status.lock().unwrap().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
