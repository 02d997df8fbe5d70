use chrono::{DateTime, Utc};

use crate::core::models::usage::{RateLimitBucket, UsageSnapshot, UsageWindow};

/// Epoch values above this are milliseconds, at or below it seconds.
///
/// 1e11 seconds is roughly the year 5138 while 1e11 milliseconds is early
/// 1973, so real timestamps of either unit fall on the expected side.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Convert a used percentage into a remaining percentage in [0, 100].
pub fn used_to_left(used_percent: Option<f64>) -> Option<f64> {
    used_percent
        .filter(|x| x.is_finite())
        .map(|x| (100.0 - x).clamp(0.0, 100.0))
}

/// Convert an absolute reset time to epoch seconds.
pub fn epoch_to_seconds(reset_at: f64) -> f64 {
    if reset_at > EPOCH_MILLIS_THRESHOLD {
        reset_at / 1000.0
    } else {
        reset_at
    }
}

/// Seconds until `window` resets, relative to `now`.
pub fn reset_seconds(window: &UsageWindow, now: DateTime<Utc>) -> Option<f64> {
    if let Some(after) = window.reset_after_seconds.filter(|s| s.is_finite()) {
        return Some(after.max(0.0));
    }
    let reset_at = window.reset_at.filter(|s| s.is_finite())?;
    let now_secs = now.timestamp_millis() as f64 / 1000.0;
    Some((epoch_to_seconds(reset_at) - now_secs).max(0.0))
}

/// Build a snapshot from the selected bucket. A missing bucket yields an
/// all-unknown, not-limited snapshot.
pub fn normalize(bucket: Option<&RateLimitBucket>, now: DateTime<Utc>) -> UsageSnapshot {
    let Some(bucket) = bucket else {
        return UsageSnapshot::default();
    };

    let primary = bucket.primary_window.as_ref();
    let secondary = bucket.secondary_window.as_ref();

    UsageSnapshot {
        primary_left_percent: used_to_left(primary.and_then(|w| w.used_percent)),
        secondary_left_percent: used_to_left(secondary.and_then(|w| w.used_percent)),
        primary_reset_seconds: primary.and_then(|w| reset_seconds(w, now)),
        secondary_reset_seconds: secondary.and_then(|w| reset_seconds(w, now)),
        is_limited: bucket.limit_reached == Some(true) || bucket.allowed == Some(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn window(used: Option<f64>, after: Option<f64>, at: Option<f64>) -> UsageWindow {
        UsageWindow {
            used_percent: used,
            reset_after_seconds: after,
            reset_at: at,
        }
    }

    #[test]
    fn used_to_left_complements_in_range_values() {
        for x in [0.0, 0.5, 19.0, 50.0, 64.0, 99.9, 100.0] {
            let left = used_to_left(Some(x)).unwrap();
            assert!((left + x - 100.0).abs() < 1e-9, "x = {}", x);
        }
    }

    #[test]
    fn used_to_left_clamps_and_rejects_non_finite() {
        assert_eq!(used_to_left(Some(-20.0)), Some(100.0));
        assert_eq!(used_to_left(Some(150.0)), Some(0.0));
        assert_eq!(used_to_left(Some(f64::NAN)), None);
        assert_eq!(used_to_left(Some(f64::INFINITY)), None);
        assert_eq!(used_to_left(None), None);
    }

    #[test]
    fn reset_after_seconds_takes_priority() {
        let w = window(None, Some(120.0), Some(1_700_009_999.0));
        assert_eq!(reset_seconds(&w, fixed_now()), Some(120.0));
    }

    #[test]
    fn reset_at_seconds_relative_to_now() {
        let w = window(None, None, Some(1_700_003_600.0));
        assert_eq!(reset_seconds(&w, fixed_now()), Some(3600.0));
    }

    #[test]
    fn reset_at_milliseconds_detected_by_magnitude() {
        let w = window(None, None, Some(1_999_999_999_999.0));
        let secs = reset_seconds(&w, fixed_now()).unwrap();
        assert!((secs - (1_999_999_999.999 - 1_700_000_000.0)).abs() < 1e-3);
    }

    #[test]
    fn epoch_threshold_boundary() {
        let boundary = EPOCH_MILLIS_THRESHOLD;
        assert_eq!(epoch_to_seconds(boundary), boundary);
        assert_eq!(epoch_to_seconds(boundary + 1000.0), 100_000_001.0);
        assert_eq!(epoch_to_seconds(9_999_999_999.0), 9_999_999_999.0);
    }

    #[test]
    fn past_reset_clamps_to_zero() {
        let w = window(None, None, Some(1_600_000_000.0));
        assert_eq!(reset_seconds(&w, fixed_now()), Some(0.0));
        let w = window(None, Some(-5.0), None);
        assert_eq!(reset_seconds(&w, fixed_now()), Some(0.0));
    }

    #[test]
    fn non_finite_reset_values_are_ignored() {
        let w = window(None, Some(f64::NAN), Some(1_700_000_060.0));
        assert_eq!(reset_seconds(&w, fixed_now()), Some(60.0));
        let w = window(None, None, Some(f64::INFINITY));
        assert_eq!(reset_seconds(&w, fixed_now()), None);
    }

    #[test]
    fn limited_flag_from_either_field() {
        let reached = RateLimitBucket {
            limit_reached: Some(true),
            ..Default::default()
        };
        assert!(normalize(Some(&reached), fixed_now()).is_limited);

        let denied = RateLimitBucket {
            allowed: Some(false),
            ..Default::default()
        };
        assert!(normalize(Some(&denied), fixed_now()).is_limited);

        let fine = RateLimitBucket {
            allowed: Some(true),
            limit_reached: Some(false),
            ..Default::default()
        };
        assert!(!normalize(Some(&fine), fixed_now()).is_limited);
        assert!(!normalize(Some(&RateLimitBucket::default()), fixed_now()).is_limited);
    }

    #[test]
    fn missing_bucket_is_all_unknown() {
        let snapshot = normalize(None, fixed_now());
        assert_eq!(snapshot, UsageSnapshot::default());
        assert!(snapshot.primary_left_percent.is_none());
        assert!(snapshot.secondary_reset_seconds.is_none());
        assert!(!snapshot.is_limited);
    }

    #[test]
    fn normalize_is_idempotent() {
        let bucket = RateLimitBucket {
            allowed: Some(true),
            limit_reached: Some(false),
            primary_window: Some(window(Some(19.0), Some(900.0), None)),
            secondary_window: Some(window(Some(64.0), None, Some(1_700_100_000.0))),
        };
        let a = normalize(Some(&bucket), fixed_now());
        let b = normalize(Some(&bucket), fixed_now());
        assert_eq!(a, b);
        assert_eq!(a.primary_left_percent, Some(81.0));
        assert_eq!(a.secondary_left_percent, Some(36.0));
        assert_eq!(a.primary_reset_seconds, Some(900.0));
        assert_eq!(a.secondary_reset_seconds, Some(100_000.0));
    }
}
