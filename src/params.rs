//! Layered query-parameter handling.
//!
//! Request parameters arrive in three configuration layers (path, query,
//! "other") that are merged with partition overrides into the final query
//! string before each fetch. The same key may legitimately be configured in
//! only one of the query/other layers; configuring it in both is ambiguous
//! and rejected before any network call.

use crate::Partition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final merged query-parameter set sent with one request.
///
/// Mutated in place per window/page before each fetch (window bounds and the
/// page number are injected into it).
pub type ParamMap = BTreeMap<String, String>;

/// Configuration errors. Raised immediately, before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The same key is configured in both the query and other layers.
    #[error("parameter {key:?} configured in both query and other layers")]
    ConflictingParameter {
        /// Offending parameter key
        key: String,
    },

    /// A required parameter is configured nowhere.
    #[error("required parameter {key:?} missing from configuration")]
    MissingParameter {
        /// Missing parameter key
        key: String,
    },

    /// A path template placeholder has no value in any layer.
    #[error("no value for path placeholder {placeholder:?}")]
    UnresolvedPlaceholder {
        /// Placeholder name as written in the template
        placeholder: String,
    },

    /// The resolved extraction interval is inverted.
    #[error("start bound {from} exceeds end bound {to}")]
    InvertedRange {
        /// Resolved lower bound
        from: chrono::NaiveDate,
        /// Resolved upper bound
        to: chrono::NaiveDate,
    },
}

/// Outcome of resolving one key across the query/other layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<T> {
    /// Exactly one layer supplies the key.
    Value(T),
    /// No layer supplies the key.
    Missing,
    /// Both layers supply the key.
    Conflict,
}

impl<T> Resolved<T> {
    /// The resolved value, if exactly one layer supplied it.
    pub fn ok(self) -> Option<T> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Convert into a result, naming `key` in the error.
    pub fn into_result(self, key: &str) -> Result<T, ConfigError> {
        match self {
            Resolved::Value(v) => Ok(v),
            Resolved::Missing => Err(ConfigError::MissingParameter { key: key.to_string() }),
            Resolved::Conflict => Err(ConfigError::ConflictingParameter { key: key.to_string() }),
        }
    }
}

/// The three configuration layers a stream definition supplies.
///
/// `path` values fill URL template placeholders; `query` and `other` merge
/// into the query string. Partition values override all layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamLayers {
    /// Values for URL path template placeholders
    #[serde(default)]
    pub path: ParamMap,
    /// Query-string parameters
    #[serde(default)]
    pub query: ParamMap,
    /// Additional parameters (alternate configuration surface)
    #[serde(default)]
    pub other: ParamMap,
}

impl ParamLayers {
    /// Resolve one key across the query/other layers.
    pub fn resolve(&self, key: &str) -> Resolved<&str> {
        match (self.query.get(key), self.other.get(key)) {
            (Some(_), Some(_)) => Resolved::Conflict,
            (Some(v), None) | (None, Some(v)) => Resolved::Value(v.as_str()),
            (None, None) => Resolved::Missing,
        }
    }

    /// Merge the query/other layers and partition overrides into the final
    /// parameter set.
    ///
    /// Any key present in both the query and other layers is a configuration
    /// error. Partition values always win over configured ones.
    pub fn merged(&self, partition: &Partition) -> Result<ParamMap, ConfigError> {
        let mut merged = self.query.clone();
        for (key, value) in &self.other {
            if merged.contains_key(key) {
                return Err(ConfigError::ConflictingParameter { key: key.clone() });
            }
            merged.insert(key.clone(), value.clone());
        }
        for (key, value) in partition.iter() {
            merged.insert(key.to_string(), value.to_string());
        }
        Ok(merged)
    }

    /// Value for a path placeholder: partition first, then the path layer,
    /// then the query/other layers.
    pub fn placeholder_value<'a>(
        &'a self,
        partition: &'a Partition,
        name: &str,
    ) -> Option<&'a str> {
        partition
            .get(name)
            .or_else(|| self.path.get(name).map(String::as_str))
            .or_else(|| self.resolve(name).ok())
    }
}
