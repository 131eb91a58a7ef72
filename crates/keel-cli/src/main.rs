use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use keel_core::config::DEFAULT_CONFIG_FILE;

mod commands;

#[derive(Parser)]
#[command(
    name = "keel",
    about = "keel — versioned container deploys with automatic rollback",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to keel.toml. Missing files are allowed when KEEL_* env vars
    /// supply the image.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, swap, and health-check the next version.
    ///
    /// Without VERSION the patch of the current version is bumped; with
    /// MAJOR.MINOR the release becomes MAJOR.MINOR.0. An unhealthy release
    /// is rolled back automatically and the command exits non-zero.
    Deploy {
        /// Explicit MAJOR.MINOR for this release.
        version: Option<String>,
        /// Report format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Roll the running service back to the previous image.
    Rollback {
        /// Report format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Snapshot the working tree into the backup directory.
    Backup,
    /// Restore the working tree from the backup directory.
    Restore,
    /// Show the persisted version, registry tags, and recent history.
    Status {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Number of history entries to show.
        #[arg(short = 'n', long, default_value = "5")]
        history: usize,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,keel=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Deploy { version, format } => {
            commands::deploy::deploy(config, version.as_deref(), &format).await
        }
        Commands::Rollback { format } => commands::deploy::rollback(config, &format).await,
        Commands::Backup => commands::backup::backup(&config),
        Commands::Restore => commands::backup::restore(&config),
        Commands::Status { format, history } => {
            commands::status::status(&config, &format, history).await
        }
    }
}
