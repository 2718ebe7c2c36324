//! Tests for start-bound resolution from layered state and configuration

use chrono::NaiveDate;
use market_data_extractor::extractor::job::ReplicationConfig;
use market_data_extractor::state::{
    resolve_start, Bound, PartitionBookmark, PersistedState, StateError,
};
use market_data_extractor::windows::resolve_lower_bound;
use market_data_extractor::Partition;
use serde_json::json;
use std::io::Write;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config() -> ReplicationConfig {
    ReplicationConfig::new("date", Bound::Date(date(2010, 1, 1)))
}

fn partition() -> Partition {
    Partition::new().with("symbol", "AAPL.US")
}

#[test]
fn test_priority_global_start_is_the_floor_of_last_resort() {
    let state = PersistedState::new();
    let bound = resolve_start(&partition(), &state, &config());
    assert_eq!(bound, Bound::Date(date(2010, 1, 1)));
}

#[test]
fn test_priority_stream_start_beats_global_start() {
    let state = PersistedState::new();
    let config = config().with_stream_start(Bound::Date(date(2018, 6, 1)));
    let bound = resolve_start(&partition(), &state, &config);
    assert_eq!(bound, Bound::Date(date(2018, 6, 1)));
}

#[test]
fn test_priority_starting_value_beats_configured_starts() {
    let mut state = PersistedState::new();
    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            replication_value: None,
            starting_value: Some(json!("2021-03-15")),
        },
    );
    let config = config().with_stream_start(Bound::Date(date(2018, 6, 1)));
    let bound = resolve_start(&partition(), &state, &config);
    assert_eq!(bound, Bound::Date(date(2021, 3, 15)));
}

#[test]
fn test_priority_high_water_mark_beats_everything() {
    let mut state = PersistedState::new();
    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            replication_value: Some(json!("2024-02-20")),
            starting_value: Some(json!("2021-03-15")),
        },
    );
    let config = config().with_stream_start(Bound::Date(date(2018, 6, 1)));
    let bound = resolve_start(&partition(), &state, &config);
    assert_eq!(bound, Bound::Date(date(2024, 2, 20)));
}

#[test]
fn test_resolve_start_is_idempotent() {
    let mut state = PersistedState::new();
    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            replication_value: Some(json!("2024-02-20")),
            starting_value: None,
        },
    );
    let config = config();
    let first = resolve_start(&partition(), &state, &config);
    for _ in 0..5 {
        assert_eq!(resolve_start(&partition(), &state, &config), first);
    }
}

#[test]
fn test_integer_cursor_follows_the_same_chain() {
    let config = ReplicationConfig::new("part", Bound::Int(0));
    let mut state = PersistedState::new();

    assert_eq!(resolve_start(&partition(), &state, &config), Bound::Int(0));

    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            replication_value: Some(json!(7)),
            starting_value: None,
        },
    );
    assert_eq!(resolve_start(&partition(), &state, &config), Bound::Int(7));
}

#[test]
fn test_bookmarks_are_per_partition() {
    let mut state = PersistedState::new();
    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            replication_value: Some(json!("2024-02-20")),
            starting_value: None,
        },
    );
    let other = Partition::new().with("symbol", "MSFT.US");
    assert_eq!(
        resolve_start(&other, &state, &config()),
        Bound::Date(date(2010, 1, 1))
    );
}

#[test]
fn test_lower_bound_applies_safety_overlap() {
    let mut state = PersistedState::new();
    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            replication_value: Some(json!("2024-06-15")),
            starting_value: None,
        },
    );
    let config = config();
    let lower = resolve_lower_bound(&partition(), &state, Some(&config));
    assert_eq!(lower, date(2024, 6, 14));
}

#[test]
fn test_lower_bound_never_precedes_the_configured_floor() {
    let mut state = PersistedState::new();
    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            // Mark right at the floor: the overlap would step below it.
            replication_value: Some(json!("2010-01-01")),
            starting_value: None,
        },
    );
    let lower = resolve_lower_bound(&partition(), &state, Some(&config()));
    assert_eq!(lower, date(2010, 1, 1));
}

#[test]
fn test_lower_bound_full_refresh_is_epoch() {
    let lower = resolve_lower_bound(&partition(), &PersistedState::new(), None);
    assert_eq!(lower, date(1970, 1, 1));
}

#[test]
fn test_load_state_file_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let mut state = PersistedState::new();
    state.set_bookmark(
        &partition(),
        PartitionBookmark {
            replication_value: Some(json!("2024-02-20")),
            starting_value: None,
        },
    );
    std::fs::write(&path, serde_json::to_string_pretty(&state).unwrap()).unwrap();

    let loaded = PersistedState::load(&path).unwrap();
    assert_eq!(
        resolve_start(&partition(), &loaded, &config()),
        Bound::Date(date(2024, 2, 20))
    );
}

#[test]
fn test_load_rejects_unknown_schema_version() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"schema_version": "9.9.9", "bookmarks": {}}"#).unwrap();

    match PersistedState::load(&path) {
        Err(StateError::SchemaVersionMismatch { found, .. }) => assert_eq!(found, "9.9.9"),
        other => panic!("expected SchemaVersionMismatch, got {other:?}"),
    }
}

#[test]
fn test_load_rejects_mangled_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"{ not json").unwrap();

    assert!(matches!(
        PersistedState::load(&path),
        Err(StateError::Deserialization(_))
    ));
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    assert!(matches!(PersistedState::load(&path), Err(StateError::Io(_))));
}
