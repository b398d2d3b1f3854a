pub mod config;
pub mod diagnostics;
pub mod merge;
pub mod registry;
pub mod remote;
pub mod scheduler;

mod context;
mod credentials;
mod domain_client;
mod error;
mod manager;
mod payload;
mod provisioner;

#[cfg(test)]
mod testing;

pub use config::{
    ConfigFile, DomainOutcome, SchedulerSettings, SyncOutcome, SyncPhase, SyncReport,
    SyncSettings, SyncState, SyncStatus, Visibility,
};
pub use context::SyncContext;
pub use credentials::CredentialStore;
pub use diagnostics::{DiagnosticsReport, Reachability, Recommendation};
pub use domain_client::DomainSyncClient;
pub use error::SyncError;
pub use manager::SyncManager;
pub use merge::{merge, MERGE_RULES_VERSION};
pub use payload::{
    AnalyticsPayload, AppState, ChallengesPayload, DomainPayload, IdRecord, MetadataPayload,
    RecordId, TodosPayload, TrackersPayload,
};
pub use provisioner::{ProvisionReport, Provisioned, ResourceProvisioner};
pub use registry::{describe, describe_key, Domain, ResourceDescriptor};
pub use remote::{DocumentApi, HttpDocumentClient, MemoryDocumentApi, RemoteError, RemoteUser};
pub use scheduler::{start_auto_sync, AutoSyncScheduler, LocalStateProvider, SyncSchedulerMessage};
