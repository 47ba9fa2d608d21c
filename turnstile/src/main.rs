use clap::Parser;
use tracing_subscriber::EnvFilter;
use turnstile::{DEFAULT_LOCKOUT_THRESHOLD, LockoutConfig, SqliteStorage, Turnstile};

/// Command line interface for turnstile account lockout administration
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "TURNSTILE_DATABASE_URL")]
    db_url: String,

    /// Consecutive failed attempts that lock an account
    #[arg(long, default_value_t = DEFAULT_LOCKOUT_THRESHOLD)]
    threshold: u32,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Show the lockout status of an account as JSON
    Status { identifier: String },
    /// Clear the lock and failure counter of an account
    Unlock { identifier: String },
    /// List locked accounts, most recently locked first
    Locked,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("turnstile v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = LockoutConfig::default().with_threshold(cli.threshold);
    config.validate()?;

    let storage = SqliteStorage::connect(&cli.db_url).await?;
    let turnstile =
        Turnstile::new(std::sync::Arc::new(storage.into_repository_provider())).with_config(config)?;

    match cli.command {
        Commands::Migrate => {
            println!("Running migrations...");
            turnstile.migrate().await?;
            println!("Migrations applied");
        }
        Commands::Status { identifier } => {
            let status = turnstile.lockout_status(&identifier).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Unlock { identifier } => {
            if turnstile.unlock_account(&identifier).await? {
                println!("Unlocked {identifier}");
            } else {
                println!("{identifier} was not locked");
            }
        }
        Commands::Locked => {
            for record in turnstile.locked_accounts().await? {
                let locked_at = record
                    .locked_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}", record.identifier, locked_at);
            }
        }
        Commands::Version => {}
    }

    Ok(())
}
