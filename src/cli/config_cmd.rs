use anyhow::{Context, Result};

use crate::core::config::AppConfig;
use crate::core::models::preferences::{resolve_percent_command, resolve_reset_command};

pub fn init() -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    let path = AppConfig::default()
        .save()
        .context("Failed to generate config")?;
    println!("Generated config at {}", path.display());
    Ok(())
}

pub fn check() -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `codex-status config init` to create one.");
        return Ok(());
    }

    let config = AppConfig::load().context("Failed to load config")?;
    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK: {}", path.display());
        println!("  auth file: {}", config.refresh.auth_path().display());
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}

pub fn path() -> Result<()> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}

/// Toggle or set the persisted percent mode.
pub fn percent(arg: Option<&str>) -> Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    match resolve_percent_command(config.display.percent_mode, arg) {
        Some(mode) => {
            config.display.percent_mode = mode;
            config.save().context("Failed to save config")?;
            println!("Percent mode: {}", mode.suffix());
        }
        None => eprintln!(
            "Unknown percent mode '{}' (expected left|used); unchanged",
            arg.unwrap_or_default()
        ),
    }
    Ok(())
}

/// Toggle or set which window's reset countdown is shown.
pub fn reset(arg: Option<&str>) -> Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    match resolve_reset_command(config.display.reset_window, arg) {
        Some(window) => {
            config.display.reset_window = window;
            config.save().context("Failed to save config")?;
            println!("Reset countdown: {}", window.tag());
        }
        None => eprintln!(
            "Unknown reset window '{}' (expected short|long); unchanged",
            arg.unwrap_or_default()
        ),
    }
    Ok(())
}
