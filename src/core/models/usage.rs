use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys whose presence makes a JSON object a rate-limit bucket.
const BUCKET_KEYS: [&str; 4] = ["primary_window", "secondary_window", "limit_reached", "allowed"];

/// One raw rate window as reported by the usage endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Percentage of the window that has been used (nominally 0.0 - 100.0)
    pub used_percent: Option<f64>,
    /// Seconds until the window resets; wins over `reset_at`
    pub reset_after_seconds: Option<f64>,
    /// Absolute reset time, epoch seconds or milliseconds
    pub reset_at: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitBucket {
    pub allowed: Option<bool>,
    pub limit_reached: Option<bool>,
    /// Short window (usually the 5-hour session)
    pub primary_window: Option<UsageWindow>,
    /// Long window (usually the 7-day week)
    pub secondary_window: Option<UsageWindow>,
}

/// Normalized usage state, rebuilt on every successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub primary_left_percent: Option<f64>,
    pub secondary_left_percent: Option<f64>,
    pub primary_reset_seconds: Option<f64>,
    pub secondary_reset_seconds: Option<f64>,
    pub is_limited: bool,
}

/// Read a JSON value as a number. Numeric strings are accepted since some
/// backends serialize percentages as text.
pub fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key).and_then(Value::as_bool)
}

fn window_field(obj: &Map<String, Value>, key: &str) -> Option<UsageWindow> {
    obj.get(key).and_then(UsageWindow::from_value)
}

impl UsageWindow {
    /// Build a window from a JSON object. Anything else (null, scalars,
    /// arrays) is treated as an absent window.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            used_percent: obj.get("used_percent").and_then(number_value),
            reset_after_seconds: obj.get("reset_after_seconds").and_then(number_value),
            reset_at: obj.get("reset_at").and_then(number_value),
        })
    }
}

impl RateLimitBucket {
    /// Returns true if `value` is an object carrying at least one bucket key.
    pub fn is_bucket(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| BUCKET_KEYS.iter().any(|k| obj.contains_key(*k)))
    }

    /// Interpret `value` as a bucket, or `None` if it fails the structural test.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !Self::is_bucket(value) {
            return None;
        }
        let obj = value.as_object()?;
        Some(Self {
            allowed: bool_field(obj, "allowed"),
            limit_reached: bool_field(obj, "limit_reached"),
            primary_window: window_field(obj, "primary_window"),
            secondary_window: window_field(obj, "secondary_window"),
        })
    }
}
