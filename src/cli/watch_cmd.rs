use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::cli::output::OutputOptions;
use crate::cli::renderer;
use crate::cli::status_cmd::spawn_coordinator;
use crate::core::config::AppConfig;
use crate::core::coordinator::{CoordinatorHandle, Trigger};
use crate::core::models::preferences::DisplayPreferences;

/// A line typed on stdin while watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Refresh,
    TurnEnd,
    Model(String),
    Percent(Option<String>),
    Reset(Option<String>),
    Start,
    Stop,
    Quit,
}

pub fn parse_command(line: &str) -> Option<WatchCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?.to_lowercase();
    let arg = parts.next().map(str::to_string);
    match verb.as_str() {
        "refresh" => Some(WatchCommand::Refresh),
        "turn" => Some(WatchCommand::TurnEnd),
        "model" => arg.map(WatchCommand::Model),
        "percent" => Some(WatchCommand::Percent(arg)),
        "reset" => Some(WatchCommand::Reset(arg)),
        "start" => Some(WatchCommand::Start),
        "stop" => Some(WatchCommand::Stop),
        "quit" | "exit" => Some(WatchCommand::Quit),
        _ => None,
    }
}

fn persist_preferences(config: &mut AppConfig, prefs: DisplayPreferences) {
    config.display.set_preferences(prefs);
    if let Err(e) = config.save() {
        warn!(error = %e, "failed to persist display preferences");
    }
}

/// Apply one command. Returns false when watching should end.
async fn dispatch(
    command: WatchCommand,
    handle: &CoordinatorHandle,
    config: &mut AppConfig,
) -> Result<bool> {
    match command {
        WatchCommand::Refresh => handle.refresh_active(Trigger::Manual)?,
        WatchCommand::TurnEnd => handle.refresh_active(Trigger::TurnEnd)?,
        WatchCommand::Model(model) => handle.request_refresh(model, Trigger::ModelSelect)?,
        WatchCommand::Percent(arg) => match handle.set_percent_mode(arg.as_deref()).await? {
            Some(prefs) => persist_preferences(config, prefs),
            None => warn!(arg = ?arg, "expected left|used"),
        },
        WatchCommand::Reset(arg) => match handle.set_reset_window(arg.as_deref()).await? {
            Some(prefs) => persist_preferences(config, prefs),
            None => warn!(arg = ?arg, "expected short|long"),
        },
        WatchCommand::Start => {
            handle.start_timer(config.refresh.interval())?;
            handle.refresh_active(Trigger::Startup)?;
        }
        WatchCommand::Stop => handle.stop_timer()?,
        WatchCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Keep the status line fresh until stdin says `quit` or Ctrl-C arrives.
///
/// Every update is printed as one line; an empty line means "hide".
pub async fn run(model: Option<String>, opts: &OutputOptions) -> Result<()> {
    let mut config = AppConfig::load().unwrap_or_default();
    let model = model.unwrap_or_else(|| config.refresh.model.clone());

    let (handle, mut updates, task) = spawn_coordinator(&config, &model)?;
    let use_color = opts.use_color;
    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            let line = renderer::render_update(&update, use_color);
            println!("{}", line.unwrap_or_default());
        }
    });

    handle.request_refresh(model.as_str(), Trigger::Startup)?;
    handle.start_timer(config.refresh.interval())?;
    info!(model = model.as_str(), "watching usage");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match parse_command(&line) {
                        Some(command) => {
                            if !dispatch(command, &handle, &mut config).await? {
                                break;
                            }
                        }
                        None => warn!(line = line.as_str(), "unknown command"),
                    },
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.stop_timer()?;
    handle.shutdown()?;
    task.await?;
    printer.await?;
    Ok(())
}
