//! Codesync CLI
//!
//! Runs the sync server and talks to it from the command line.
//!
//! # Commands
//!
//! - `serve` - Run the sync server
//! - `get` - Print the current code of a session
//! - `push` - Replace the code of a session from a file or stdin
//! - `join` - Join a session and print the participant count
//! - `watch` - Follow a session and print every remote change

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use codesync_client::ClientConfig;
use codesync_server::{ParticipantPolicy, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Shared code editor sync server and client.
#[derive(Parser)]
#[command(name = "codesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server URL
    #[arg(global = true, long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Session id (defaults to the shared "default" session)
    #[arg(global = true, long)]
    session: Option<String>,

    /// Participant id (random if omitted)
    #[arg(global = true, long)]
    participant: Option<String>,

    /// Request timeout in seconds
    #[arg(global = true, long, default_value_t = 5)]
    timeout: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Seconds of silence after which a device is dropped
        #[arg(long, default_value_t = 30)]
        ttl: u64,

        /// Seconds between presence reaps
        #[arg(long, default_value_t = 5)]
        reap_interval: u64,

        /// How participant counts evolve
        #[arg(long, value_enum, default_value_t = Policy::Cumulative)]
        policy: Policy,
    },

    /// Print the current code of a session
    Get,

    /// Replace the code of a session
    Push {
        /// File to upload (stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Join a session and print the participant count
    Join,

    /// Follow a session and print every remote change
    Watch {
        /// Directory for the offline cache (memory only if omitted)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

/// Participant counting policy.
#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Every join counts forever
    Cumulative,
    /// Only devices still sending heartbeats count
    Connected,
}

impl From<Policy> for ParticipantPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Cumulative => ParticipantPolicy::Cumulative,
            Policy::Connected => ParticipantPolicy::Connected,
        }
    }
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.server.clone())
            .with_request_timeout(Duration::from_secs(self.timeout));
        if let Some(session) = &self.session {
            config = config.with_session(session.clone());
        }
        if let Some(participant) = &self.participant {
            config = config.with_participant_id(participant.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client_config = cli.client_config();

    match cli.command {
        Commands::Serve {
            bind,
            ttl,
            reap_interval,
            policy,
        } => {
            let config = ServerConfig::new(bind)
                .with_request_timeout(Duration::from_secs(cli.timeout))
                .with_presence_ttl(Duration::from_secs(ttl))
                .with_reap_interval(Duration::from_secs(reap_interval))
                .with_participant_policy(policy.into());
            commands::serve::run(config).await?;
        }
        Commands::Get => {
            commands::session::get(&client_config).await?;
        }
        Commands::Push { file } => {
            commands::session::push(&client_config, file.as_deref()).await?;
        }
        Commands::Join => {
            commands::session::join(&client_config).await?;
        }
        Commands::Watch { cache_dir } => {
            commands::watch::run(client_config, cache_dir).await?;
        }
        Commands::Version => {
            println!("codesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "default session: {}",
                codesync_protocol::DEFAULT_SESSION_ID
            );
        }
    }

    Ok(())
}
