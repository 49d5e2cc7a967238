use anyhow::Result;
use clap::Parser;
use gmail_autoreply::cli::{self, Cli, Commands};
use gmail_autoreply::config::Config;
use gmail_autoreply::error::AutoReplyError;
use gmail_autoreply::state::{self, ReplyLog};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-autoreply --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // This is necessary because multiple dependencies use different crypto providers
    // On non-Windows platforms, use aws-lc-rs (better performance, FIPS support)
    // On Windows, use ring (better compatibility, no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing with level based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoreply=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoreply=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Gmail auto-reply service starting...");

    // Execute command
    match cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            // Delete existing token if force flag is set
            if force && gmail_autoreply::auth::clear_token_cache(&cli.token_cache).await? {
                tracing::info!("Removed existing token cache");
            }

            let config = Config::load(&cli.config).await?;

            // Report which Google Cloud project the flow will run against
            // (skipped when the secret comes from the environment)
            if std::env::var(gmail_autoreply::auth::CREDENTIALS_ENV).is_err() {
                let creds = gmail_autoreply::auth::load_credentials(&cli.credentials).await?;
                println!(
                    "Using OAuth client from project: {}",
                    creds.installed.project_id
                );
            }

            // Initialize Gmail hub (will trigger OAuth flow if needed)
            let hub = gmail_autoreply::auth::initialize_gmail_hub(
                &cli.credentials,
                &cli.token_cache,
                &config.auth.scopes,
            )
            .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Test the connection - must specify scope to avoid triggering additional OAuth flow
            let mut call = hub.users().get_profile("me");
            for scope in &config.auth.scopes {
                call = call.add_scope(scope);
            }
            let (_, profile) = call.doit().await.map_err(AutoReplyError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Run { once } => {
            if once {
                tracing::info!("Starting a single poll cycle");
            } else {
                tracing::info!("Starting the auto-reply poll loop");
            }

            cli::run_service(&cli, once).await?;

            Ok(())
        }

        Commands::Serve { ref host, port } => {
            tracing::info!("Starting the dashboard server");

            cli::run_dashboard(&cli, host, port).await?;

            Ok(())
        }

        Commands::Status => {
            tracing::info!("Checking status...");

            let status = state::load_status(&cli.status_file).await?;
            let log = ReplyLog::load(&cli.data_file).await?;

            println!("\n========================================");
            println!("Auto-Reply Service Status");
            println!("========================================");
            match status {
                Some(status) => println!("Status: {}", status),
                None => println!("Status: never run"),
            }
            println!("Replied mails: {}", log.replied_mails.len());
            println!("Ignored mails: {}", log.ignored_mails.len());
            println!("Status file: {:?}", cli.status_file);
            println!("Reply log: {:?}", cli.data_file);
            println!("========================================");

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            // Check if file exists
            if output.exists() && !force {
                return Err(AutoReplyError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            // Create example config
            Config::create_example(&output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - reply.keywords: Subjects containing these get an automated reply");
            println!("  - reply.template: The fallback reply text");
            println!("  - reply.use_ai: Generate replies with OpenAI instead of the template");
            println!("  - poll.interval_secs: Seconds between poll cycles");

            Ok(())
        }
    }
}
