//! Locate the rate-limit bucket that applies to the active model.
//!
//! The usage endpoint reports a default bucket under `rate_limit` and, for
//! accounts with model-specific limits, extra buckets under
//! `additional_rate_limits`. That collection has been observed both as an
//! array of wrappers (`{limit_name, rate_limit}`) and as an object keyed by
//! limit name, so matching works on loosely typed JSON rather than a fixed
//! serde schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::models::usage::RateLimitBucket;

/// Model identifier of the Spark tier, which has its own limits.
pub const SPARK_MODEL_ID: &str = "gpt-5.3-codex-spark";

const SPARK_MARKER: &str = "spark";
const DEFAULT_BUCKET_KEY: &str = "rate_limit";
const ADDITIONAL_BUCKETS_KEY: &str = "additional_rate_limits";
const LIMIT_NAME_FIELD: &str = "limit_name";
const IDENTIFYING_FIELDS: [&str; 4] = ["name", "id", "slug", "key"];
const MAX_NESTING: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchStrength {
    /// Normalized identifier equals [`SPARK_MODEL_ID`].
    Exact,
    /// Normalized identifier merely contains "spark".
    Loose,
}

/// Knobs for Spark bucket lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Accept substring matches on "spark" once exact matching failed.
    pub loose_spark_match: bool,
    /// Scan top-level response keys when the collection has no match.
    pub scan_top_level: bool,
    /// Use the default bucket when no Spark bucket is found.
    pub spark_fallback_to_default: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            loose_spark_match: true,
            scan_top_level: true,
            spark_fallback_to_default: false,
        }
    }
}

impl SelectionPolicy {
    fn strengths(&self) -> &'static [MatchStrength] {
        if self.loose_spark_match {
            &[MatchStrength::Exact, MatchStrength::Loose]
        } else {
            &[MatchStrength::Exact]
        }
    }

    /// Returns true if `model_id` should read the Spark bucket.
    ///
    /// A provider prefix such as `openai/` is ignored. Model ids that only
    /// contain "spark" count when `loose_spark_match` is set.
    pub fn targets_spark(&self, model_id: &str) -> bool {
        let normalized = normalize_id(model_id);
        let bare = normalized.rsplit('/').next().unwrap_or_default();
        self.strengths()
            .iter()
            .any(|&strength| identifier_matches(bare, strength))
    }
}

fn normalize_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn identifier_matches(candidate: &str, strength: MatchStrength) -> bool {
    let normalized = normalize_id(candidate);
    if normalized.is_empty() {
        return false;
    }
    match strength {
        MatchStrength::Exact => normalized == SPARK_MODEL_ID,
        MatchStrength::Loose => normalized.contains(SPARK_MARKER),
    }
}

fn field_matches(entry: &Map<String, Value>, field: &str, strength: MatchStrength) -> bool {
    entry
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| identifier_matches(s, strength))
}

fn entry_matches(entry: &Value, map_key: Option<&str>, strength: MatchStrength) -> bool {
    if map_key.is_some_and(|k| identifier_matches(k, strength)) {
        return true;
    }
    let Some(obj) = entry.as_object() else {
        return false;
    };
    field_matches(obj, LIMIT_NAME_FIELD, strength)
        || IDENTIFYING_FIELDS
            .iter()
            .any(|f| field_matches(obj, f, strength))
}

/// Nested `rate_limit` first, then the entry itself.
fn bucket_from_entry(entry: &Value) -> Option<RateLimitBucket> {
    entry
        .get(DEFAULT_BUCKET_KEY)
        .and_then(RateLimitBucket::from_value)
        .or_else(|| RateLimitBucket::from_value(entry))
}

/// Depth-limited search for the first object that passes the bucket test.
fn extract_nested_bucket(value: &Value, depth: usize) -> Option<RateLimitBucket> {
    if let Some(bucket) = bucket_from_entry(value) {
        return Some(bucket);
    }
    if depth == 0 {
        return None;
    }
    value
        .as_object()?
        .values()
        .find_map(|child| extract_nested_bucket(child, depth - 1))
}

fn search_collection(collection: &Value, strength: MatchStrength) -> Option<RateLimitBucket> {
    match collection {
        Value::Array(entries) => entries
            .iter()
            .filter(|entry| entry_matches(entry, None, strength))
            .find_map(bucket_from_entry),
        Value::Object(entries) => entries
            .iter()
            .filter(|(key, entry)| entry_matches(entry, Some(key.as_str()), strength))
            .find_map(|(_, entry)| bucket_from_entry(entry)),
        _ => None,
    }
}

fn search_top_level(
    response: &Map<String, Value>,
    strength: MatchStrength,
) -> Option<RateLimitBucket> {
    response
        .iter()
        .filter(|(key, _)| {
            key.as_str() != DEFAULT_BUCKET_KEY && key.as_str() != ADDITIONAL_BUCKETS_KEY
        })
        .filter(|(key, _)| identifier_matches(key, strength))
        .find_map(|(_, value)| extract_nested_bucket(value, MAX_NESTING))
}

fn select_spark_bucket(response: &Value, policy: &SelectionPolicy) -> Option<RateLimitBucket> {
    if let Some(collection) = response.get(ADDITIONAL_BUCKETS_KEY) {
        for &strength in policy.strengths() {
            if let Some(bucket) = search_collection(collection, strength) {
                if strength == MatchStrength::Loose {
                    warn!("Spark bucket matched by substring only in {}", ADDITIONAL_BUCKETS_KEY);
                }
                return Some(bucket);
            }
        }
    }

    if policy.scan_top_level {
        if let Some(obj) = response.as_object() {
            for &strength in policy.strengths() {
                if let Some(bucket) = search_top_level(obj, strength) {
                    if strength == MatchStrength::Loose {
                        warn!("Spark bucket matched by substring on a top-level key");
                    }
                    return Some(bucket);
                }
            }
        }
    }

    None
}

/// Pick the bucket that applies to `model_id`.
///
/// Standard models always read the default `rate_limit` bucket. The Spark
/// model searches model-specific buckets and only falls back to the default
/// when `policy.spark_fallback_to_default` is set.
pub fn select_bucket(
    response: &Value,
    model_id: &str,
    policy: &SelectionPolicy,
) -> Option<RateLimitBucket> {
    let default_bucket = || {
        response
            .get(DEFAULT_BUCKET_KEY)
            .and_then(RateLimitBucket::from_value)
    };

    if !policy.targets_spark(model_id) {
        return default_bucket();
    }

    if let Some(bucket) = select_spark_bucket(response, policy) {
        return Some(bucket);
    }

    if policy.spark_fallback_to_default {
        debug!(model = %model_id, "no Spark bucket found, using default rate limit");
        return default_bucket();
    }

    debug!(model = model_id, "no Spark bucket found");
    None
}
