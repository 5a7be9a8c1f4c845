use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod gateway;
mod send;

/// Carapace — conversational-agent gateway with durable sessions
#[derive(Parser)]
#[command(name = "carapace", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to carapace.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway and agent runtime
    Gateway,
    /// Send a message to a running gateway and print the reply
    Send {
        /// Message text
        message: String,

        /// Session ID to resume (creates a new session if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Gateway URL (default: ws://<gateway.listen>/ws from config)
        #[arg(short, long)]
        url: Option<String>,

        /// Auth token (default: gateway.auth_token from config)
        #[arg(short, long)]
        token: Option<String>,

        /// Run autonomously until the agent signals completion
        #[arg(long)]
        ralph: bool,
    },
}

impl Cli {
    pub async fn run(self) -> carapace_core::Result<()> {
        // --verbose > --quiet > --log-level > info
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or("info")
        };

        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
            )
            .with_target(false)
            .init();

        let config = carapace_config::ConfigLoader::load(self.config.as_deref())?;

        match self.command {
            Commands::Gateway => gateway::cmd_gateway(config).await,
            Commands::Send {
                message,
                session,
                url,
                token,
                ralph,
            } => send::cmd_send(config, message, session, url, token, ralph).await,
        }
    }
}
