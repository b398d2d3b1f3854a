use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use super::context::SyncContext;
use super::registry::Domain;
use super::remote::RemoteUser;

/// Result of probing one domain's resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Reachability {
    Reachable,
    Unreachable { error: String },
    /// No resource id is known for the domain
    Unprovisioned,
}

/// Suggested repair action; none of these run automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "domain", rename_all = "camelCase")]
pub enum Recommendation {
    Reauthenticate,
    Recreate(Domain),
    Provision(Domain),
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Reauthenticate => write!(f, "sign in again"),
            Recommendation::Recreate(domain) => write!(f, "recreate the {} resource", domain),
            Recommendation::Provision(domain) => write!(f, "provision the {} resource", domain),
        }
    }
}

/// Health snapshot of the credentials and every domain's resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<RemoteUser>,
    pub resource_ids: BTreeMap<Domain, String>,
    pub reachability: BTreeMap<Domain, Reachability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    pub recommendations: Vec<Recommendation>,
}

impl DiagnosticsReport {
    pub fn is_healthy(&self) -> bool {
        self.recommendations.is_empty()
    }
}

/// Validate the token and probe every known resource concurrently
pub async fn diagnose(ctx: &SyncContext) -> DiagnosticsReport {
    let credentials = ctx.credentials();
    let resource_ids = credentials.resource_ids();
    let mut report = DiagnosticsReport {
        authenticated: false,
        user: None,
        resource_ids: resource_ids.clone(),
        reachability: BTreeMap::new(),
        last_sync: credentials.last_sync(),
        recommendations: Vec::new(),
    };

    let token = credentials.token();

    match &token {
        None => {
            report.recommendations.push(Recommendation::Reauthenticate);
            for &domain in resource_ids.keys() {
                report.reachability.insert(
                    domain,
                    Reachability::Unreachable {
                        error: "not authenticated".to_string(),
                    },
                );
            }
        }
        Some(token) => {
            let probes = join_all(resource_ids.iter().map(|(&domain, id)| async move {
                let result = ctx.call(ctx.api().read_resource(token, id)).await;
                (domain, result)
            }));
            let (user, probes) = tokio::join!(ctx.call(ctx.api().current_user(token)), probes);

            match user {
                Ok(user) => {
                    report.authenticated = true;
                    report.user = Some(user);
                }
                Err(e) => {
                    log::warn!("Diagnostics: identity check failed: {}", e);
                    if e.is_auth_failure() {
                        report.recommendations.push(Recommendation::Reauthenticate);
                    } else {
                        // Token may still be fine, the API is just unreachable
                        report.authenticated = true;
                    }
                }
            }

            for (domain, result) in probes {
                let reachability = match result {
                    Ok(_) => Reachability::Reachable,
                    Err(e) => {
                        log::warn!("Diagnostics: {} resource unreachable: {}", domain, e);
                        if !e.is_auth_failure() {
                            report.recommendations.push(Recommendation::Recreate(domain));
                        }
                        Reachability::Unreachable {
                            error: e.to_string(),
                        }
                    }
                };
                report.reachability.insert(domain, reachability);
            }
        }
    }

    for domain in Domain::ALL {
        if !resource_ids.contains_key(&domain) {
            report.reachability.insert(domain, Reachability::Unprovisioned);
            report.recommendations.push(Recommendation::Provision(domain));
        }
    }

    report
}
