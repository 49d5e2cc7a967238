//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gmail-autoreply")]
#[command(version = "0.3.1")]
#[command(about = "Automated Gmail auto-reply service", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-autoreply/token.json")]
    pub token_cache: PathBuf,

    /// Path to the reply log file
    #[arg(long, default_value = ".gmail-autoreply/data.json")]
    pub data_file: PathBuf,

    /// Path to the run status file
    #[arg(long, default_value = ".gmail-autoreply/status.json")]
    pub status_file: PathBuf,

    /// Path to the pending policy edit file
    #[arg(long, default_value = ".gmail-autoreply/policy_edits.json")]
    pub edits_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Run the auto-reply poll loop in the foreground
    Run {
        /// Execute a single poll cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Run the JSON dashboard server
    Serve {
        /// Address to bind the dashboard to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind the dashboard to
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },

    /// Show the persisted run status and log counts
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

use crate::auth::{self, GmailHub};
use crate::client::GmailMailClient;
use crate::composer::{OpenAiCompletionClient, ReplyComposer};
use crate::config::Config;
use crate::dashboard::{self, AppState};
use crate::engine::MailCycleEngine;
use crate::error::Result;
use crate::poller::{self, ServicePaths};
use std::time::Duration;
use tracing::info;

/// Collect the service file locations from the global CLI options
pub fn service_paths(cli: &Cli) -> ServicePaths {
    ServicePaths {
        data_file: cli.data_file.clone(),
        status_file: cli.status_file.clone(),
        edits_file: cli.edits_file.clone(),
    }
}

/// Assemble a cycle engine from an authenticated hub and the configuration
pub fn build_engine(hub: GmailHub, config: &Config) -> MailCycleEngine {
    let client = GmailMailClient::new(hub, &config.auth.scopes);
    let composer = ReplyComposer::new(Box::new(OpenAiCompletionClient::from_config(&config.ai)));
    MailCycleEngine::new(Box::new(client), composer, &config.poll.labels)
}

/// Run the polling service in the foreground
///
/// With `once` set, a single cycle is executed and the process exits.
/// Otherwise the loop is spawned as a supervised task and runs until
/// ctrl-c requests a stop.
pub async fn run_service(cli: &Cli, once: bool) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, &config.auth.scopes)
        .await?;

    let engine = build_engine(hub, &config);
    let policy = config.reply_policy();
    let paths = service_paths(cli);

    if once {
        info!("Running a single poll cycle");
        return poller::run_cycle_once(&engine, &policy, &paths).await;
    }

    let interval = Duration::from_secs(config.poll.interval_secs);
    let handle = poller::spawn(engine, policy, interval, paths);

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-c received, stopping poller");
    handle.request_stop();
    handle.join().await;

    Ok(())
}

/// Run the dashboard server
///
/// The poller is not started automatically; POST /api/start spawns one
/// on demand, building a fresh engine from the authenticated hub.
pub async fn run_dashboard(cli: &Cli, host: &str, port: u16) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, &config.auth.scopes)
        .await?;

    let paths = service_paths(cli);
    let policy = config.reply_policy();
    let interval = Duration::from_secs(config.poll.interval_secs);

    let engine_config = config.clone();
    let state = AppState::new(
        paths,
        policy,
        interval,
        Box::new(move || build_engine(hub.clone(), &engine_config)),
    );

    dashboard::run_server(state, host, port).await
}
