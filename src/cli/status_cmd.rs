use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::config::AppConfig;
use crate::core::coordinator::{CoordinatorHandle, RefreshCoordinator, StatusUpdate, Trigger};
use crate::core::fetch::HttpUsageSource;
use crate::core::models::preferences::DisplayPreferences;
use crate::core::models::usage::UsageSnapshot;

#[derive(Serialize)]
struct StatusPayload<'a> {
    model: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<String>,
    snapshot: Option<UsageSnapshot>,
    preferences: DisplayPreferences,
}

/// Build the HTTP-backed coordinator for `config` and start its loop.
pub fn spawn_coordinator(
    config: &AppConfig,
    model: &str,
) -> Result<(
    CoordinatorHandle,
    mpsc::UnboundedReceiver<StatusUpdate>,
    JoinHandle<()>,
)> {
    let source = HttpUsageSource::new(config).context("Failed to build HTTP client")?;
    let (tx, rx) = mpsc::unbounded_channel();
    let coordinator = RefreshCoordinator::new(
        Arc::new(source),
        Box::new(tx),
        config.selection.clone(),
        config.display.label.clone(),
        config.display.preferences(),
        model,
    );
    let (handle, task) = coordinator.spawn();
    Ok((handle, rx, task))
}

fn status_name(update: &StatusUpdate) -> &'static str {
    match update {
        StatusUpdate::Usage { .. } => "ok",
        StatusUpdate::Unavailable(_) => "unavailable",
        StatusUpdate::Hidden => "hidden",
    }
}

/// Refresh once and print the status line.
///
/// Prints nothing when credentials are missing.
pub async fn run(model: Option<String>, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().unwrap_or_default();
    let model = model.unwrap_or_else(|| config.refresh.model.clone());

    let (handle, mut updates, task) = spawn_coordinator(&config, &model)?;
    handle.request_refresh(model.as_str(), Trigger::Manual)?;
    let update = updates
        .recv()
        .await
        .context("Refresh coordinator stopped before reporting")?;
    let state = handle.state().await?;
    handle.shutdown()?;
    task.await?;

    match opts.format {
        OutputFormat::Text => {
            if let Some(line) = renderer::render_update(&update, opts.use_color) {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            let payload = StatusPayload {
                model: &model,
                status: status_name(&update),
                line: renderer::render_update(&update, false),
                snapshot: state.snapshot,
                preferences: state.prefs,
            };
            let json = if opts.pretty {
                serde_json::to_string_pretty(&payload)?
            } else {
                serde_json::to_string(&payload)?
            };
            println!("{}", json);
        }
    }

    Ok(())
}
