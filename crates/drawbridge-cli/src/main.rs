//! Command line entry point

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use commands::storage::StorageCommand;

#[derive(Parser)]
#[command(name = "drawbridge", version, about = "Reverse proxy with automatic TLS")]
struct Cli {
    /// Log level: trace, debug, info, warn, error
    #[arg(
        long,
        global = true,
        env = "DRAWBRIDGE_LOG_LEVEL",
        default_value = "info"
    )]
    log_level: String,

    /// Log format: full or compact
    #[arg(
        long,
        global = true,
        env = "DRAWBRIDGE_LOG_FORMAT",
        default_value = "compact"
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and migrate the certificate storage
    Storage(StorageCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    match cli.command {
        Commands::Storage(command) => command.execute(),
    }
}

fn init_logging(level: &str, format: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().expect("invalid RUST_LOG filter")
    } else {
        EnvFilter::new(format!(
            "drawbridge_cli={level},drawbridge_acme={level},drawbridge_core={level},drawbridge_kv={level},rustls=warn,hickory_resolver=warn",
            level = level
        ))
    };

    let fmt_layer = match format {
        "full" => fmt::layer().with_target(true).boxed(),
        _ => fmt::layer().compact().with_target(false).boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to install the log subscriber");
}
