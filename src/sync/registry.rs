//! Static table of synced domains and the remote resource backing each one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An independently-synced partition of the application state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Metadata,
    Trackers,
    Challenges,
    Todos,
    Analytics,
}

impl Domain {
    /// Every domain, in the order used for reports and fan-out
    pub const ALL: [Domain; 5] = [
        Domain::Metadata,
        Domain::Trackers,
        Domain::Challenges,
        Domain::Todos,
        Domain::Analytics,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Domain::Metadata => "metadata",
            Domain::Trackers => "trackers",
            Domain::Challenges => "challenges",
            Domain::Todos => "todos",
            Domain::Analytics => "analytics",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDomain(pub String);

impl fmt::Display for UnknownDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown domain '{}'", self.0)
    }
}

impl std::error::Error for UnknownDomain {}

impl FromStr for Domain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        describe_key(s)
            .map(|d| d.domain)
            .ok_or_else(|| UnknownDomain(s.to_string()))
    }
}

/// Remote resource description for one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub domain: Domain,
    /// Human-readable label, also used to find an existing resource remotely
    pub label: &'static str,
    /// Name of the file holding the JSON payload inside the resource
    pub filename: &'static str,
    /// Key under which the resolved resource id is persisted locally
    pub storage_key: &'static str,
}

static REGISTRY: [ResourceDescriptor; 5] = [
    ResourceDescriptor {
        domain: Domain::Metadata,
        label: "docsync: metadata",
        filename: "metadata.json",
        storage_key: "docsync.resource.metadata",
    },
    ResourceDescriptor {
        domain: Domain::Trackers,
        label: "docsync: trackers",
        filename: "trackers.json",
        storage_key: "docsync.resource.trackers",
    },
    ResourceDescriptor {
        domain: Domain::Challenges,
        label: "docsync: challenges",
        filename: "challenges.json",
        storage_key: "docsync.resource.challenges",
    },
    ResourceDescriptor {
        domain: Domain::Todos,
        label: "docsync: todos",
        filename: "todos.json",
        storage_key: "docsync.resource.todos",
    },
    ResourceDescriptor {
        domain: Domain::Analytics,
        label: "docsync: analytics",
        filename: "analytics.json",
        storage_key: "docsync.resource.analytics",
    },
];

/// Descriptor for a domain
pub fn describe(domain: Domain) -> &'static ResourceDescriptor {
    // REGISTRY is ordered like the Domain declaration
    &REGISTRY[domain as usize]
}

/// Descriptor for a domain key such as `"todos"`, `None` for unknown keys
pub fn describe_key(key: &str) -> Option<&'static ResourceDescriptor> {
    REGISTRY.iter().find(|d| d.domain.key() == key)
}

/// Descriptor whose label matches a remote resource label
pub fn describe_label(label: &str) -> Option<&'static ResourceDescriptor> {
    REGISTRY.iter().find(|d| d.label == label)
}
