mod subcommands;

#[cfg(test)]
mod tests;

use crate::agent::AiAgent;
use crate::channels::{BotManager, ProviderRegistry};
use crate::config::{Config, load_config};
use crate::gateway::{self, GatewayState};
use crate::handler::MessageHandler;
use crate::store::SqliteStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bizbot")]
#[command(about = "Business chatbot backend for Telegram and WhatsApp")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config to the bizbot home directory
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP gateway and every persisted bot
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },
    /// Manage bot records
    Bots {
        #[command(subcommand)]
        cmd: BotCommands,
    },
    /// Classify a message and print the intent breakdown
    Detect {
        /// Message text to classify
        text: String,
    },
    /// Show configuration and credential status
    Status,
}

#[derive(Subcommand)]
enum BotCommands {
    /// List registered bots
    List {
        /// Only show bots for this platform (telegram, whatsapp)
        #[arg(long)]
        platform: Option<String>,
    },
    /// Register a new bot
    Add {
        #[arg(long)]
        platform: String,
        #[arg(long, short = 't')]
        token: String,
        #[arg(long)]
        webhook_url: Option<String>,
        /// Disable Telegram long polling
        #[arg(long)]
        no_polling: bool,
        #[arg(long)]
        phone_number_id: Option<String>,
        #[arg(long)]
        business_id: Option<String>,
    },
    /// Delete a bot record
    Remove {
        id: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            subcommands::init_command(force)?;
        }
        Commands::Serve { host, port } => {
            serve(host, port).await?;
        }
        Commands::Bots { cmd } => {
            subcommands::bots_command(cmd).await?;
        }
        Commands::Detect { text } => {
            subcommands::detect_command(&text).await?;
        }
        Commands::Status => {
            subcommands::status_command()?;
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let path = config.database_path()?;
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    info!("Loading configuration...");
    let mut config = load_config(None)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let store = open_store(&config)?;
    let agent = Arc::new(AiAgent::from_config(&config.ai)?);
    info!("AI provider: {}", agent.current_provider().name());

    let handler = Arc::new(MessageHandler::new(store.clone(), agent.clone()));
    let manager = Arc::new(BotManager::new(
        store.clone(),
        ProviderRegistry::from_config(&config),
        handler,
    ));

    let resumed = manager.load_from_persistence().await?;
    info!("resumed {} bot(s)", resumed);

    let state = GatewayState::new(manager.clone(), store, agent, &config);
    let server = gateway::start(&config.server.host, config.server.port, state).await?;

    println!(
        "bizbot {} listening on {}:{}",
        crate::VERSION,
        config.server.host,
        config.server.port
    );
    println!("Active bots: {}", manager.active_bots().await.len());

    tokio::select! {
        () = shutdown_signal() => {
            println!("\nShutting down...");
        }
        res = server => {
            if let Err(e) = res {
                warn!("gateway task ended unexpectedly: {}", e);
            }
        }
    }

    manager.stop_all().await;
    info!("all bots stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
