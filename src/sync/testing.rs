//! Fixtures shared by the sync tests.

use std::sync::Arc;

use super::config::SyncSettings;
use super::context::SyncContext;
use super::credentials::CredentialStore;
use super::remote::MemoryDocumentApi;
use crate::storage::MemoryStore;

pub const TEST_TOKEN: &str = "test-token";

/// Context over `api` with no stored token
pub fn anonymous_context(api: &Arc<MemoryDocumentApi>) -> SyncContext {
    let store = Arc::new(MemoryStore::new());
    let credentials = CredentialStore::load(store).unwrap();
    SyncContext::new(api.clone(), Arc::new(credentials), SyncSettings::default())
}

/// Context over `api` holding `TEST_TOKEN`
pub fn signed_in_context(api: &Arc<MemoryDocumentApi>) -> SyncContext {
    let ctx = anonymous_context(api);
    ctx.credentials().set_token(TEST_TOKEN).unwrap();
    ctx
}
