mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "codex-status", about = "Compact Codex rate-limit status line", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Model whose limits to show (default: from config)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Shorthand for JSON output
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh once and print the status line
    Status,
    /// Keep refreshing; reads commands from stdin
    Watch,
    /// Toggle or set percent display (left|used)
    Percent {
        value: Option<String>,
    },
    /// Toggle or set which reset countdown is shown (short|long)
    Reset {
        value: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print the config file location
    Path,
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("codex_status=debug")
        } else {
            EnvFilter::new("codex_status=info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let output_opts = cli::output::OutputOptions {
        format: if cli.json {
            cli::output::OutputFormat::Json
        } else {
            cli::output::OutputFormat::Text
        },
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color),
    };

    match cli.command {
        None | Some(Commands::Status) => cli::status_cmd::run(cli.model, &output_opts).await?,
        Some(Commands::Watch) => cli::watch_cmd::run(cli.model, &output_opts).await?,
        Some(Commands::Percent { value }) => cli::config_cmd::percent(value.as_deref())?,
        Some(Commands::Reset { value }) => cli::config_cmd::reset(value.as_deref())?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init()?,
            ConfigAction::Check => cli::config_cmd::check()?,
            ConfigAction::Path => cli::config_cmd::path()?,
        },
    }

    Ok(())
}
