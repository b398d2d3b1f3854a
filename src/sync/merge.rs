//! Field-level reconciliation of a local and a remote `AppState`.
//!
//! Precedence rules:
//! - map-keyed collections (trackers, tracker categories, challenges): local
//!   entries overwrite remote ones with the same key
//! - id-keyed arrays (todos, todo categories, achievements): remote records
//!   are kept, local records are appended when their id is new
//! - scalar records (metadata, stats): local unless it is empty
//!
//! No timestamps are compared. Changing any rule changes what users see after
//! a sync, so bump `MERGE_RULES_VERSION` with it.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use super::payload::{
    AnalyticsPayload, AppState, ChallengesPayload, IdRecord, MetadataPayload, TodosPayload,
    TrackersPayload,
};

pub const MERGE_RULES_VERSION: u32 = 1;

/// Merge `local` with `remote`. Pure and total.
pub fn merge(local: AppState, remote: &AppState) -> AppState {
    let AppState {
        metadata,
        trackers,
        challenges,
        todos,
        analytics,
    } = local;

    AppState {
        metadata: merge_metadata(metadata, &remote.metadata),
        trackers: TrackersPayload {
            trackers: merge_keyed_map(trackers.trackers, &remote.trackers.trackers),
            categories: merge_keyed_map(trackers.categories, &remote.trackers.categories),
        },
        challenges: ChallengesPayload {
            challenges: merge_keyed_map(challenges.challenges, &remote.challenges.challenges),
        },
        todos: TodosPayload {
            todos: merge_by_id(todos.todos, &remote.todos.todos),
            categories: merge_by_id(todos.categories, &remote.todos.categories),
            stats: prefer_local(todos.stats, &remote.todos.stats),
        },
        analytics: AnalyticsPayload {
            achievements: merge_by_id(analytics.achievements, &remote.analytics.achievements),
            stats: prefer_local(analytics.stats, &remote.analytics.stats),
        },
    }
}

/// Remote entries overlaid with local ones; local wins on key collision
fn merge_keyed_map(
    local: BTreeMap<String, Value>,
    remote: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = remote.clone();
    merged.extend(local);
    merged
}

/// Remote records followed by local records with unseen ids. Each id appears
/// exactly once; within one side the first occurrence wins.
fn merge_by_id(local: Vec<IdRecord>, remote: &[IdRecord]) -> Vec<IdRecord> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(remote.len() + local.len());

    for record in remote.iter().cloned().chain(local) {
        if seen.insert(record.id.clone()) {
            merged.push(record);
        }
    }
    merged
}

fn prefer_local(local: Map<String, Value>, remote: &Map<String, Value>) -> Map<String, Value> {
    if local.is_empty() {
        remote.clone()
    } else {
        local
    }
}

fn merge_metadata(local: MetadataPayload, remote: &MetadataPayload) -> MetadataPayload {
    if local.is_empty() {
        remote.clone()
    } else {
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::payload::RecordId;
    use serde_json::json;

    fn ids(records: &[IdRecord]) -> Vec<RecordId> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_todos_from_both_sides_are_kept() {
        let mut local = AppState::default();
        local.todos.todos.push(IdRecord::new("1"));
        let mut remote = AppState::default();
        remote.todos.todos.push(IdRecord::new("2"));

        let merged = merge(local, &remote);

        assert_eq!(ids(&merged.todos.todos), vec![RecordId::from("2"), RecordId::from("1")]);
    }

    #[test]
    fn test_remote_wins_for_id_keyed_records() {
        let mut local = AppState::default();
        local
            .analytics
            .achievements
            .push(IdRecord::new(7).with_field("unlocked", json!(false)));
        let mut remote = AppState::default();
        remote
            .analytics
            .achievements
            .push(IdRecord::new(7).with_field("unlocked", json!(true)));

        let merged = merge(local, &remote);

        assert_eq!(merged.analytics.achievements.len(), 1);
        assert_eq!(merged.analytics.achievements[0].fields["unlocked"], json!(true));
    }

    #[test]
    fn test_local_wins_for_map_keyed_records() {
        let mut local = AppState::default();
        local
            .trackers
            .trackers
            .insert("water".to_string(), json!({"goal": 10}));
        local
            .challenges
            .challenges
            .insert("30-days".to_string(), json!({"day": 4}));
        let mut remote = AppState::default();
        remote
            .trackers
            .trackers
            .insert("water".to_string(), json!({"goal": 8}));
        remote
            .trackers
            .trackers
            .insert("steps".to_string(), json!({"goal": 10000}));
        remote
            .challenges
            .challenges
            .insert("30-days".to_string(), json!({"day": 2}));

        let merged = merge(local, &remote);

        assert_eq!(merged.trackers.trackers["water"], json!({"goal": 10}));
        assert_eq!(merged.trackers.trackers["steps"], json!({"goal": 10000}));
        assert_eq!(merged.challenges.challenges["30-days"], json!({"day": 4}));
    }

    #[test]
    fn test_every_id_appears_exactly_once() {
        let mut local = AppState::default();
        local.todos.categories = vec![IdRecord::new("a"), IdRecord::new("b"), IdRecord::new("a")];
        let mut remote = AppState::default();
        remote.todos.categories = vec![IdRecord::new("b"), IdRecord::new("c"), IdRecord::new("c")];

        let merged = merge(local, &remote);

        assert_eq!(
            ids(&merged.todos.categories),
            vec![RecordId::from("b"), RecordId::from("c"), RecordId::from("a")]
        );
    }

    #[test]
    fn test_numeric_and_text_ids_are_distinct() {
        let mut local = AppState::default();
        local.todos.todos.push(IdRecord::new(1));
        let mut remote = AppState::default();
        remote.todos.todos.push(IdRecord::new("1"));

        assert_eq!(merge(local, &remote).todos.todos.len(), 2);
    }

    #[test]
    fn test_scalars_prefer_non_empty_local() {
        let mut remote = AppState::default();
        remote.todos.stats.insert("completed".to_string(), json!(12));
        remote.metadata.app_version = Some("1.0.0".to_string());

        // Empty local falls back to remote
        let merged = merge(AppState::default(), &remote);
        assert_eq!(merged.todos.stats["completed"], json!(12));
        assert_eq!(merged.metadata.app_version.as_deref(), Some("1.0.0"));

        let mut local = AppState::default();
        local.todos.stats.insert("completed".to_string(), json!(3));
        local.metadata.app_version = Some("1.1.0".to_string());
        let merged = merge(local, &remote);
        assert_eq!(merged.todos.stats["completed"], json!(3));
        assert_eq!(merged.metadata.app_version.as_deref(), Some("1.1.0"));
    }

    #[test]
    fn test_empty_sides() {
        let mut state = AppState::default();
        state.todos.todos.push(IdRecord::new("1"));
        state
            .trackers
            .categories
            .insert("health".to_string(), json!({"color": "green"}));
        state.analytics.stats.insert("xp".to_string(), json!(40));

        assert_eq!(merge(state.clone(), &AppState::default()), state);
        assert_eq!(merge(AppState::default(), &state), state);
        assert_eq!(merge(AppState::default(), &AppState::default()), AppState::default());
    }
}
