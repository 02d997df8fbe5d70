use serde::{Deserialize, Serialize};

/// Whether percentages are shown as remaining or consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentMode {
    #[default]
    Left,
    Used,
}

impl PercentMode {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "left" | "remaining" => Some(Self::Left),
            "used" => Some(Self::Used),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Left => Self::Used,
            Self::Used => Self::Left,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Used => "used",
        }
    }
}

/// Which window's reset countdown trails the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetWindow {
    Short,
    #[default]
    Long,
}

impl ResetWindow {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "short" | "5h" | "primary" => Some(Self::Short),
            "long" | "7d" | "weekly" | "secondary" => Some(Self::Long),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Short => Self::Long,
            Self::Long => Self::Short,
        }
    }

    /// Short tag used in the status line ("5h" / "7d").
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Short => "5h",
            Self::Long => "7d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayPreferences {
    #[serde(default)]
    pub percent_mode: PercentMode,
    #[serde(default)]
    pub reset_window: ResetWindow,
}

/// Resolve a `percent` command argument against the current mode.
///
/// No argument toggles, a recognized token sets, anything else returns
/// `None` and leaves the state alone.
pub fn resolve_percent_command(current: PercentMode, arg: Option<&str>) -> Option<PercentMode> {
    match arg.map(str::trim).filter(|a| !a.is_empty()) {
        None => Some(current.toggled()),
        Some(token) => PercentMode::from_token(token),
    }
}

/// Same contract as [`resolve_percent_command`] for the `reset` command.
pub fn resolve_reset_command(current: ResetWindow, arg: Option<&str>) -> Option<ResetWindow> {
    match arg.map(str::trim).filter(|a| !a.is_empty()) {
        None => Some(current.toggled()),
        Some(token) => ResetWindow::from_token(token),
    }
}
