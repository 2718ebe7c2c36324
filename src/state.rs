//! Persisted replication state and incremental start-bound resolution.
//!
//! The state file is owned and written by the surrounding runner; this
//! module only reads it. [`resolve_start`] layers the persisted high-water
//! mark over configured fallbacks in strict priority order, so a partition
//! always has a start bound and a narrower known bound is never silently
//! widened back to "all time".

use crate::extractor::job::ReplicationConfig;
use crate::Partition;
use chrono::NaiveDate;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info, warn};

/// Current state file schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed state file size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// A replication start bound: a date high-water mark or an integer cursor
/// (part/page number). Ordering is only defined within one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    /// Date high-water mark
    Date(NaiveDate),
    /// Integer cursor (part or page number)
    Int(i64),
}

impl Bound {
    /// The date, if this is a date bound.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Bound::Date(d) => Some(*d),
            Bound::Int(_) => None,
        }
    }

    /// The integer, if this is an integer bound.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Bound::Int(i) => Some(*i),
            Bound::Date(_) => None,
        }
    }

    /// Parse a persisted JSON value into a bound.
    ///
    /// Integers parse as cursors; strings parse as `YYYY-MM-DD` dates or as
    /// RFC 3339 timestamps truncated to their date. Anything else is ignored
    /// with a warning so one malformed bookmark cannot fail the partition.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Bound::Int),
            serde_json::Value::String(s) => {
                if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    return Some(Bound::Date(date));
                }
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                    return Some(Bound::Date(dt.date_naive()));
                }
                warn!(value = %s, "Unparseable replication bound value, ignoring");
                None
            }
            _ => {
                warn!(?value, "Unsupported replication bound type, ignoring");
                None
            }
        }
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Date(d) => write!(f, "{d}"),
            Bound::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Persisted bookmark for one partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionBookmark {
    /// Highest replication-key value successfully extracted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_value: Option<serde_json::Value>,
    /// Runner-provided override for where extraction should start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_value: Option<serde_json::Value>,
}

/// Replication state for all partitions of one extraction target.
///
/// Monotonically non-decreasing per partition, owned and persisted by the
/// caller; the engine only reads it to compute resume points.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    #[serde(default)]
    bookmarks: HashMap<String, PartitionBookmark>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl PersistedState {
    /// An empty state (first run).
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            bookmarks: HashMap::new(),
        }
    }

    /// The bookmark for a partition, if one was persisted.
    pub fn bookmark(&self, partition: &Partition) -> Option<&PartitionBookmark> {
        self.bookmarks.get(&partition.state_key())
    }

    /// Insert or replace a partition's bookmark in memory.
    ///
    /// Persisting the result is the caller's concern; the engine never
    /// writes the state file.
    pub fn set_bookmark(&mut self, partition: &Partition, bookmark: PartitionBookmark) {
        self.bookmarks.insert(partition.state_key(), bookmark);
    }

    /// Load state from the runner-owned file.
    ///
    /// Takes a shared `fd-lock` so a concurrently-writing runner cannot tear
    /// the read, enforces a file-size cap, and rejects unknown schema
    /// versions.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        debug!(path = %path.display(), "Loading replication state");

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StateError::Lock(format!("failed to create lock file: {e}")))?;

        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| StateError::Lock(format!("failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| StateError::Io(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StateError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| StateError::Io(e.to_string()))?;
        let state: PersistedState = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize replication state");
            StateError::Deserialization(e.to_string())
        })?;

        if state.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %state.schema_version,
                expected_version = SCHEMA_VERSION,
                "Replication state schema version mismatch"
            );
            return Err(StateError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: state.schema_version,
            });
        }

        info!(
            partitions = state.bookmarks.len(),
            "Replication state loaded"
        );
        Ok(state)
    }
}

/// Resolve the starting bound for a partition.
///
/// Strict priority order, first available wins:
/// 1. the persisted high-water mark for this partition's replication key
/// 2. a persisted starting-value override
/// 3. the stream-level configured starting bound
/// 4. the tap-wide global start
///
/// The same chain applies to integer cursors; only the comparison domain
/// changes. Pure in its inputs: identical `(partition, state, config)` yield
/// identical output.
pub fn resolve_start(
    partition: &Partition,
    state: &PersistedState,
    config: &ReplicationConfig,
) -> Bound {
    if let Some(bookmark) = state.bookmark(partition) {
        if let Some(bound) = bookmark
            .replication_value
            .as_ref()
            .and_then(Bound::from_value)
        {
            debug!(partition = %partition, %bound, "Start bound from persisted high-water mark");
            return bound;
        }
        if let Some(bound) = bookmark.starting_value.as_ref().and_then(Bound::from_value) {
            debug!(partition = %partition, %bound, "Start bound from persisted starting value");
            return bound;
        }
    }
    if let Some(bound) = config.stream_start {
        debug!(partition = %partition, %bound, "Start bound from stream configuration");
        return bound;
    }
    debug!(partition = %partition, bound = %config.global_start, "Start bound from global start");
    config.global_start
}

/// Errors reading the persisted state file.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Schema version mismatch
    #[error("state schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Lock error
    #[error("lock error: {0}")]
    Lock(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
