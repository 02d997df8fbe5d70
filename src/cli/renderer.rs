use colored::{control, ColoredString, Colorize};

use crate::core::coordinator::StatusUpdate;
use crate::core::formatter::{format_percent, format_reset_annotation, format_status_line};
use crate::core::models::preferences::{DisplayPreferences, ResetWindow};
use crate::core::models::usage::UsageSnapshot;

/// Render a status update as a single line, or `None` when the indicator
/// should not be shown at all.
///
/// Layout:
/// ```text
/// Codex 5h:81% left 7d:36% left (7d resets 2d 4h)
/// ```
pub fn render_update(update: &StatusUpdate, use_color: bool) -> Option<String> {
    control::set_override(use_color);
    match update {
        StatusUpdate::Usage {
            label,
            snapshot,
            prefs,
        } if !use_color => Some(format_status_line(label, snapshot, prefs)),
        StatusUpdate::Usage {
            label,
            snapshot,
            prefs,
        } => Some(render_usage(label, snapshot, prefs)),
        StatusUpdate::Unavailable(text) => Some(text.dimmed().to_string()),
        StatusUpdate::Hidden => None,
    }
}

fn render_usage(label: &str, snapshot: &UsageSnapshot, prefs: &DisplayPreferences) -> String {
    let label = if snapshot.is_limited {
        label.red().bold()
    } else {
        label.cyan().bold()
    };

    let mut line = format!(
        "{} {}:{} {}:{}",
        label,
        ResetWindow::Short.tag(),
        color_by_remaining(
            snapshot.primary_left_percent,
            &format_percent(snapshot.primary_left_percent, prefs.percent_mode)
        ),
        ResetWindow::Long.tag(),
        color_by_remaining(
            snapshot.secondary_left_percent,
            &format_percent(snapshot.secondary_left_percent, prefs.percent_mode)
        ),
    );

    if let Some(annotation) = format_reset_annotation(snapshot, prefs.reset_window) {
        line.push(' ');
        line.push_str(&annotation.dimmed().to_string());
    }
    line
}

/// Color the percent string green/yellow/red based on remaining percentage.
fn color_by_remaining(left_percent: Option<f64>, text: &str) -> ColoredString {
    match left_percent {
        Some(left) if left >= 25.0 => text.green(),
        Some(left) if left >= 10.0 => text.yellow(),
        Some(_) => text.red(),
        None => text.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::preferences::PercentMode;

    fn make_snapshot() -> UsageSnapshot {
        UsageSnapshot {
            primary_left_percent: Some(81.0),
            secondary_left_percent: Some(36.0),
            primary_reset_seconds: Some(3600.0),
            secondary_reset_seconds: Some(200_000.0),
            is_limited: false,
        }
    }

    fn usage_update(prefs: DisplayPreferences) -> StatusUpdate {
        StatusUpdate::Usage {
            label: "Codex".to_string(),
            snapshot: make_snapshot(),
            prefs,
        }
    }

    #[test]
    fn plain_render_matches_formatter() {
        let prefs = DisplayPreferences::default();
        let output = render_update(&usage_update(prefs), false).unwrap();
        let expected = format_status_line("Codex", &make_snapshot(), &prefs);
        assert_eq!(output, expected);
        assert!(output.starts_with("Codex 5h:81% left 7d:36% left"));
    }

    #[test]
    fn used_mode_render() {
        let prefs = DisplayPreferences {
            percent_mode: PercentMode::Used,
            reset_window: ResetWindow::Short,
        };
        let output = render_update(&usage_update(prefs), false).unwrap();
        assert_eq!(output, "Codex 5h:19% used 7d:64% used (5h resets 1h 0m)");
    }

    #[test]
    fn hidden_renders_nothing() {
        assert!(render_update(&StatusUpdate::Hidden, false).is_none());
    }

    #[test]
    fn unavailable_renders_label() {
        let update = StatusUpdate::Unavailable("Codex unavailable".to_string());
        assert_eq!(render_update(&update, false).unwrap(), "Codex unavailable");
    }

    #[test]
    fn render_no_ansi_when_color_false() {
        let output = render_update(&usage_update(DisplayPreferences::default()), false).unwrap();
        assert!(!output.contains('\x1b'), "output should not contain ANSI codes");
    }
}
