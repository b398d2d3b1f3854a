//! Typed per-domain payloads and the `AppState` they partition.
//!
//! Record bodies are owned by the application's business logic (streaks,
//! scheduling, scoring) and are carried as opaque JSON. Only the fields the
//! merger needs (map keys, record ids, emptiness) are typed here. Unknown
//! fields survive a download/upload round trip.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::registry::Domain;

/// Identifier of a record inside an id-keyed array.
///
/// Older clients wrote numeric ids (creation timestamps), newer ones strings;
/// both are accepted and compared as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Number(value)
    }
}

/// A record carrying an identity, such as a todo or an achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IdRecord {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

/// App-wide metadata (schema marker, last local update, settings)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetadataPayload {
    pub fn is_empty(&self) -> bool {
        self.last_updated.is_none() && self.app_version.is_none() && self.extra.is_empty()
    }
}

/// Habit trackers and their categories, both keyed by tracker/category key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackersPayload {
    #[serde(default)]
    pub trackers: BTreeMap<String, Value>,
    #[serde(default)]
    pub categories: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengesPayload {
    #[serde(default)]
    pub challenges: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodosPayload {
    #[serde(default)]
    pub todos: Vec<IdRecord>,
    #[serde(default)]
    pub categories: Vec<IdRecord>,
    #[serde(default)]
    pub stats: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsPayload {
    #[serde(default)]
    pub achievements: Vec<IdRecord>,
    #[serde(default)]
    pub stats: Map<String, Value>,
}

/// The sub-state owned by exactly one domain
#[derive(Debug, Clone, PartialEq)]
pub enum DomainPayload {
    Metadata(MetadataPayload),
    Trackers(TrackersPayload),
    Challenges(ChallengesPayload),
    Todos(TodosPayload),
    Analytics(AnalyticsPayload),
}

impl DomainPayload {
    pub fn domain(&self) -> Domain {
        match self {
            DomainPayload::Metadata(_) => Domain::Metadata,
            DomainPayload::Trackers(_) => Domain::Trackers,
            DomainPayload::Challenges(_) => Domain::Challenges,
            DomainPayload::Todos(_) => Domain::Todos,
            DomainPayload::Analytics(_) => Domain::Analytics,
        }
    }

    /// Initial content of a freshly provisioned resource
    pub fn default_for(domain: Domain) -> Self {
        match domain {
            Domain::Metadata => DomainPayload::Metadata(MetadataPayload::default()),
            Domain::Trackers => DomainPayload::Trackers(TrackersPayload::default()),
            Domain::Challenges => DomainPayload::Challenges(ChallengesPayload::default()),
            Domain::Todos => DomainPayload::Todos(TodosPayload::default()),
            Domain::Analytics => DomainPayload::Analytics(AnalyticsPayload::default()),
        }
    }

    /// Serialize the payload body as stored in the remote file
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            DomainPayload::Metadata(p) => serde_json::to_string_pretty(p),
            DomainPayload::Trackers(p) => serde_json::to_string_pretty(p),
            DomainPayload::Challenges(p) => serde_json::to_string_pretty(p),
            DomainPayload::Todos(p) => serde_json::to_string_pretty(p),
            DomainPayload::Analytics(p) => serde_json::to_string_pretty(p),
        }
    }

    /// Parse a remote file body as the payload of `domain`. The body must be
    /// a JSON object; arrays and scalars are rejected.
    pub fn from_json(domain: Domain, content: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(content)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected a JSON object for {}, found {}",
                domain,
                json_kind(&value)
            )));
        }

        Ok(match domain {
            Domain::Metadata => DomainPayload::Metadata(serde_json::from_value(value)?),
            Domain::Trackers => DomainPayload::Trackers(serde_json::from_value(value)?),
            Domain::Challenges => DomainPayload::Challenges(serde_json::from_value(value)?),
            Domain::Todos => DomainPayload::Todos(serde_json::from_value(value)?),
            Domain::Analytics => DomainPayload::Analytics(serde_json::from_value(value)?),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The full application state: the union of every domain payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub metadata: MetadataPayload,
    #[serde(default)]
    pub trackers: TrackersPayload,
    #[serde(default)]
    pub challenges: ChallengesPayload,
    #[serde(default)]
    pub todos: TodosPayload,
    #[serde(default)]
    pub analytics: AnalyticsPayload,
}

impl AppState {
    /// Copy of the payload owned by `domain`
    pub fn payload(&self, domain: Domain) -> DomainPayload {
        match domain {
            Domain::Metadata => DomainPayload::Metadata(self.metadata.clone()),
            Domain::Trackers => DomainPayload::Trackers(self.trackers.clone()),
            Domain::Challenges => DomainPayload::Challenges(self.challenges.clone()),
            Domain::Todos => DomainPayload::Todos(self.todos.clone()),
            Domain::Analytics => DomainPayload::Analytics(self.analytics.clone()),
        }
    }

    /// Replace the part of the state owned by the payload's domain
    pub fn set_payload(&mut self, payload: DomainPayload) {
        match payload {
            DomainPayload::Metadata(p) => self.metadata = p,
            DomainPayload::Trackers(p) => self.trackers = p,
            DomainPayload::Challenges(p) => self.challenges = p,
            DomainPayload::Todos(p) => self.todos = p,
            DomainPayload::Analytics(p) => self.analytics = p,
        }
    }

    /// Rebuild a state from whatever payloads are available; missing
    /// domains keep their default payload
    pub fn from_payloads(payloads: impl IntoIterator<Item = DomainPayload>) -> Self {
        let mut state = AppState::default();
        for payload in payloads {
            state.set_payload(payload);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = r#"{
            "todos": [{"id": 17, "text": "water plants", "done": false}],
            "categories": [{"id": "home", "color": "green"}],
            "stats": {"completed": 3}
        }"#;

        let payload = DomainPayload::from_json(Domain::Todos, raw).unwrap();
        let DomainPayload::Todos(todos) = &payload else {
            panic!("expected todos payload");
        };
        assert_eq!(todos.todos[0].id, RecordId::Number(17));
        assert_eq!(todos.todos[0].fields["text"], json!("water plants"));
        assert_eq!(todos.categories[0].id, RecordId::from("home"));

        let reparsed = DomainPayload::from_json(Domain::Todos, &payload.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, payload);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        for domain in Domain::ALL {
            let payload = DomainPayload::from_json(domain, "{}").unwrap();
            assert_eq!(payload, DomainPayload::default_for(domain));
        }
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(DomainPayload::from_json(Domain::Trackers, "[]").is_err());
        assert!(DomainPayload::from_json(Domain::Trackers, r#"[{"water": {"goal": 8}}]"#).is_err());
        assert!(DomainPayload::from_json(Domain::Metadata, "null").is_err());
        assert!(DomainPayload::from_json(Domain::Analytics, "42").is_err());
        assert!(DomainPayload::from_json(Domain::Todos, r#"{"todos": [{"text": "no id"}]}"#).is_err());
    }

    #[test]
    fn test_metadata_emptiness() {
        assert!(MetadataPayload::default().is_empty());

        let mut meta = MetadataPayload::default();
        meta.extra.insert("theme".to_string(), json!("dark"));
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_state_payload_accessors() {
        let mut challenges = ChallengesPayload::default();
        challenges
            .challenges
            .insert("30-day-run".to_string(), json!({"day": 4}));

        let state = AppState::from_payloads([DomainPayload::Challenges(challenges.clone())]);
        assert_eq!(state.challenges, challenges);
        assert_eq!(state.todos, TodosPayload::default());
        assert_eq!(
            state.payload(Domain::Challenges),
            DomainPayload::Challenges(challenges)
        );
    }
}
