use std::path::PathBuf;

use clap::{Parser, Subcommand};

use voice_relay::config::RelayConfig;
use voice_relay::gateway;

#[derive(Parser)]
#[command(name = "voice-relay", version, about = "Voice assistant chat relay")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP relay
    Serve {
        /// Address to listen on (overrides RELAY_BIND)
        #[arg(short, long)]
        bind: Option<String>,
        /// Directory of browser assets to serve (overrides RELAY_STATIC_DIR)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Show the effective configuration
    Status,
    /// Export config JSON schema
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print JSON schema for configuration
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voice_relay=info,tower_http=info".into());
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Serve { bind, static_dir } => {
            let mut cfg = RelayConfig::from_env()?;
            if let Some(bind) = bind {
                cfg.bind = bind;
            }
            if static_dir.is_some() {
                cfg.static_dir = static_dir;
            }
            gateway::run(cfg).await?;
        }
        Commands::Status => {
            let cfg = RelayConfig::from_env()?;
            println!("voice-relay status: OK");
            for line in cfg.redacted_summary().lines() {
                println!("  {line}");
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Schema => {
                println!("{}", RelayConfig::json_schema());
            }
        },
    }

    Ok(())
}
