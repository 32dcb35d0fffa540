//! Certificate storage inspection and migration

use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use tracing::info;

use drawbridge_acme::store::{legacy, KvStore, LocalStore, Store};
use drawbridge_acme::types::StoredData;
use drawbridge_kv::RedisBackend;

#[derive(Args)]
pub struct StorageCommand {
    #[command(subcommand)]
    command: StorageCommands,
}

#[derive(Subcommand)]
enum StorageCommands {
    /// Show the stored account and certificates
    Show(ShowArgs),
    /// Convert a legacy storage file to the current layout
    Convert(ConvertArgs),
}

#[derive(Args)]
struct ShowArgs {
    /// Storage file path, or the key name when reading from Redis
    #[arg(long, env = "DRAWBRIDGE_ACME_STORAGE", default_value = "acme.json")]
    path: String,

    /// Redis URL; reads the shared store instead of the local file
    #[arg(long, env = "DRAWBRIDGE_REDIS_URL")]
    redis_url: Option<String>,
}

#[derive(Args)]
struct ConvertArgs {
    /// Legacy storage file to read
    #[arg(long)]
    input: String,

    /// Where the converted storage is written
    #[arg(long)]
    output: String,
}

impl StorageCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            StorageCommands::Show(args) => execute_show(args),
            StorageCommands::Convert(args) => execute_convert(args),
        }
    }
}

fn execute_show(args: ShowArgs) -> anyhow::Result<()> {
    info!("Reading certificate storage from {}", args.path);

    let rt = tokio::runtime::Runtime::new()?;
    let data = rt.block_on(async {
        let store: Arc<dyn Store> = match &args.redis_url {
            Some(url) => {
                let backend = RedisBackend::connect(url)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;
                Arc::new(KvStore::new(Arc::new(backend), args.path.clone()))
            }
            None => Arc::new(LocalStore::new(&args.path)),
        };
        store
            .load()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read the storage: {}", e))
    })?;

    print_stored_data(&data);
    Ok(())
}

fn execute_convert(args: ConvertArgs) -> anyhow::Result<()> {
    info!("Converting legacy storage {} to {}", args.input, args.output);

    let raw = std::fs::read_to_string(&args.input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.input, e))?;
    let data =
        legacy::convert(&raw).map_err(|e| anyhow::anyhow!("Conversion failed: {}", e))?;

    LocalStore::new(&args.output)
        .save(&data)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", args.output, e))?;

    println!(
        "{} Converted {} certificate(s) to {}",
        "✓".bright_green().bold(),
        data.certificates.len(),
        args.output.bright_cyan()
    );
    println!("A new ACME account will be registered on first use");
    Ok(())
}

fn print_stored_data(data: &StoredData) {
    match &data.account {
        Some(account) => {
            println!("{}", "Account".bright_white().bold());
            println!("  Email:    {}", account.email.bright_cyan());
            println!("  CA:       {}", account.ca_server);
            println!("  Key type: {}", account.key_type);
        }
        None => println!("{}", "No account registered".bright_yellow()),
    }

    println!();
    println!(
        "{} ({})",
        "Certificates".bright_white().bold(),
        data.certificates.len()
    );
    let now = Utc::now();
    for certificate in &data.certificates {
        let names = certificate.domain.to_vec().join(", ");
        let expiry = match certificate.not_after() {
            Some(not_after) if certificate.needs_renewal(now) => {
                format!("expires {}", not_after.format("%Y-%m-%d")).bright_yellow()
            }
            Some(not_after) => format!("expires {}", not_after.format("%Y-%m-%d")).bright_green(),
            None => "unparseable".bright_red(),
        };
        println!("  {} {}", names.bright_cyan(), expiry);
    }

    let pending: usize = data
        .http_challenges
        .values()
        .map(|domains| domains.len())
        .sum();
    if pending > 0 {
        println!();
        println!(
            "{} pending HTTP challenge(s)",
            pending.to_string().bright_yellow()
        );
    }
}
