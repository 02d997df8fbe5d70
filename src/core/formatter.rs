use crate::core::models::preferences::{DisplayPreferences, PercentMode, ResetWindow};
use crate::core::models::usage::UsageSnapshot;

/// Placeholder for a percentage the endpoint did not report.
pub const UNKNOWN_PERCENT: &str = "--";

/// Percentage to display for `left_percent` under `mode`, rounded.
pub fn display_percent(left_percent: Option<f64>, mode: PercentMode) -> Option<u64> {
    let left = left_percent.filter(|p| p.is_finite())?.clamp(0.0, 100.0);
    let shown = match mode {
        PercentMode::Left => left,
        PercentMode::Used => 100.0 - left,
    };
    Some(shown.round() as u64)
}

/// Returns "81% left", "19% used" or "--".
pub fn format_percent(left_percent: Option<f64>, mode: PercentMode) -> String {
    match display_percent(left_percent, mode) {
        Some(p) => format!("{}% {}", p, mode.suffix()),
        None => UNKNOWN_PERCENT.to_string(),
    }
}

/// Returns "now", "45m", "2h 15m", "3d" or "3d 4h" for a countdown in seconds.
pub fn format_countdown(seconds: f64) -> String {
    let total_seconds = seconds as i64;
    if !seconds.is_finite() || total_seconds <= 0 {
        return "now".to_string();
    }

    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        if remaining_hours == 0 {
            format!("{}d", days)
        } else {
            format!("{}d {}h", days, remaining_hours)
        }
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", total_minutes.max(1))
    }
}

/// Reset countdown for the window selected in `prefs`, if known.
pub fn selected_reset(snapshot: &UsageSnapshot, window: ResetWindow) -> Option<f64> {
    match window {
        ResetWindow::Short => snapshot.primary_reset_seconds,
        ResetWindow::Long => snapshot.secondary_reset_seconds,
    }
}

/// Returns "(7d resets 2d 4h)" or `None` when the countdown is unknown.
pub fn format_reset_annotation(snapshot: &UsageSnapshot, window: ResetWindow) -> Option<String> {
    selected_reset(snapshot, window)
        .map(|secs| format!("({} resets {})", window.tag(), format_countdown(secs)))
}

/// Plain status line, e.g. "Codex 5h:81% left 7d:36% left (7d resets 2d 4h)".
pub fn format_status_line(
    label: &str,
    snapshot: &UsageSnapshot,
    prefs: &DisplayPreferences,
) -> String {
    let mut line = format!(
        "{} {}:{} {}:{}",
        label,
        ResetWindow::Short.tag(),
        format_percent(snapshot.primary_left_percent, prefs.percent_mode),
        ResetWindow::Long.tag(),
        format_percent(snapshot.secondary_left_percent, prefs.percent_mode),
    );
    if let Some(annotation) = format_reset_annotation(snapshot, prefs.reset_window) {
        line.push(' ');
        line.push_str(&annotation);
    }
    line
}

/// Degraded indicator shown while the endpoint is unreachable.
pub fn format_unavailable(label: &str) -> String {
    format!("{} unavailable", label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(primary: Option<f64>, secondary: Option<f64>) -> UsageSnapshot {
        UsageSnapshot {
            primary_left_percent: primary,
            secondary_left_percent: secondary,
            ..Default::default()
        }
    }

    #[test]
    fn percent_in_both_modes() {
        assert_eq!(format_percent(Some(81.0), PercentMode::Left), "81% left");
        assert_eq!(format_percent(Some(81.0), PercentMode::Used), "19% used");
        assert_eq!(format_percent(Some(35.6), PercentMode::Left), "36% left");
        assert_eq!(format_percent(None, PercentMode::Used), "--");
        assert_eq!(format_percent(Some(f64::NAN), PercentMode::Left), "--");
    }

    #[test]
    fn countdown_units() {
        assert_eq!(format_countdown(0.0), "now");
        assert_eq!(format_countdown(-3.0), "now");
        assert_eq!(format_countdown(f64::INFINITY), "now");
        assert_eq!(format_countdown(20.0), "1m");
        assert_eq!(format_countdown(45.0 * 60.0), "45m");
        assert_eq!(format_countdown(135.0 * 60.0), "2h 15m");
        assert_eq!(format_countdown(48.0 * 3600.0), "2d");
        assert_eq!(format_countdown(52.0 * 3600.0 + 120.0), "2d 4h");
    }

    #[test]
    fn status_line_left_mode() {
        let prefs = DisplayPreferences::default();
        let line = format_status_line("Codex", &snapshot(Some(81.0), Some(36.0)), &prefs);
        assert_eq!(line, "Codex 5h:81% left 7d:36% left");
    }

    #[test]
    fn status_line_used_mode() {
        let prefs = DisplayPreferences {
            percent_mode: PercentMode::Used,
            ..Default::default()
        };
        let line = format_status_line("Codex", &snapshot(Some(81.0), Some(36.0)), &prefs);
        assert_eq!(line, "Codex 5h:19% used 7d:64% used");
    }

    #[test]
    fn status_line_with_reset_annotation() {
        let mut snap = snapshot(Some(81.0), Some(36.0));
        snap.primary_reset_seconds = Some(135.0 * 60.0);
        snap.secondary_reset_seconds = Some(52.0 * 3600.0);

        let long = DisplayPreferences::default();
        assert_eq!(
            format_status_line("Codex", &snap, &long),
            "Codex 5h:81% left 7d:36% left (7d resets 2d 4h)"
        );

        let short = DisplayPreferences {
            reset_window: ResetWindow::Short,
            ..Default::default()
        };
        assert_eq!(
            format_status_line("Codex", &snap, &short),
            "Codex 5h:81% left 7d:36% left (5h resets 2h 15m)"
        );
    }

    #[test]
    fn unknown_snapshot_renders_placeholders() {
        let prefs = DisplayPreferences::default();
        let line = format_status_line("Codex", &UsageSnapshot::default(), &prefs);
        assert_eq!(line, "Codex 5h:-- 7d:--");
    }

    #[test]
    fn unavailable_label() {
        assert_eq!(format_unavailable("Codex"), "Codex unavailable");
    }
}
