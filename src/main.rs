//! pairlink - Pair companion devices with single-use codes
//!
//! Serves the verification API, runs the expiry sweeper, and offers a few
//! maintenance commands for issuing codes and seeding profiles.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pairlink_auth::{
    CodeIssuer, CodeStorage, ExpirySweeper, PairingVerifier, ProfileStorage, SignedTokenIssuer,
    UserId, UserProfile,
};
use pairlink_core::Config;
use pairlink_server::{create_router, AppState};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// pairlink - Let a companion device join your session with a 6-digit code
#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0", global = true)]
    bind: IpAddr,

    /// Server port
    #[arg(short, long, default_value = "8080", global = true)]
    port: u16,

    /// Directory holding pairing codes and profiles
    #[arg(long, env = "PAIRLINK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Seconds a new pairing code stays valid
    #[arg(long, default_value = "300", global = true)]
    code_ttl: u64,

    /// Seconds between expiry sweeps
    #[arg(long, default_value = "60", global = true)]
    sweep_interval: u64,

    /// Seconds an issued companion token stays valid
    #[arg(long, default_value = "3600", global = true)]
    token_ttl: u64,

    /// Seconds to wait for token issuance
    #[arg(long, default_value = "10", global = true)]
    issue_timeout: u64,

    /// `iss` claim of issued companion tokens
    #[arg(long, default_value = "pairlink", global = true)]
    token_issuer: String,

    /// `aud` claim of issued companion tokens
    #[arg(long, default_value = "pairlink-companion", global = true)]
    token_audience: String,

    /// Secret used to sign companion tokens (at least 32 bytes)
    #[arg(long, env = "PAIRLINK_TOKEN_SECRET", hide_env_values = true, global = true)]
    token_secret: Option<String>,

    /// Path to TLS certificate file (PEM format)
    #[arg(long, global = true)]
    cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, global = true)]
    key: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the verification API and the expiry sweeper (default)
    Serve,
    /// Issue a pairing code for a user and print it
    Issue {
        /// Account the code belongs to
        #[arg(long)]
        user: String,
    },
    /// Add or update a user profile
    Profile {
        /// Account identifier
        #[arg(long)]
        user: String,
        /// Display name shown on the companion device
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let config = build_config(&args);

    match args.command {
        Some(Command::Issue { user }) => issue_code(&config, user).await,
        Some(Command::Profile { user, name }) => save_profile(&config, user, name).await,
        Some(Command::Serve) | None => serve(config, args.cert, args.key).await,
    }
}

/// Map command line arguments onto the configuration
fn build_config(args: &Args) -> Config {
    Config::new()
        .with_bind(args.bind)
        .with_port(args.port)
        .with_data_dir(args.data_dir.clone())
        .with_code_ttl_secs(args.code_ttl)
        .with_sweep_interval_secs(args.sweep_interval)
        .with_token_ttl_secs(args.token_ttl)
        .with_issue_timeout_secs(args.issue_timeout)
        .with_token_issuer(args.token_issuer.clone())
        .with_token_audience(args.token_audience.clone())
        .with_token_secret(args.token_secret.clone().unwrap_or_default())
}

/// Issue a pairing code from the command line
async fn issue_code(config: &Config, user: String) -> Result<()> {
    config.validate_durations()?;
    let codes = Arc::new(CodeStorage::with_path(config.codes_path()?).await?);
    let record = CodeIssuer::new(codes, config.code_ttl())?
        .issue(UserId::new(user))
        .await?;

    println!("{}", record.code);
    info!("Code expires at {}", record.expiry_time);
    Ok(())
}

/// Add or update a profile from the command line
async fn save_profile(config: &Config, user: String, name: Option<String>) -> Result<()> {
    let profiles = ProfileStorage::with_path(config.profiles_path()?).await?;
    profiles
        .save_profile(UserProfile::new(UserId::new(user), name))
        .await?;
    Ok(())
}

async fn serve(config: Config, cert: Option<PathBuf>, key: Option<PathBuf>) -> Result<()> {
    config.validate()?;
    info!("pairlink v{}", env!("CARGO_PKG_VERSION"));

    // Initialize storage
    let data_dir = config.resolve_data_dir()?;
    info!("Using data directory {:?}", data_dir);
    let codes = Arc::new(
        CodeStorage::with_path(config.codes_path()?)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open pairing code storage: {}", e))?,
    );
    let profiles = Arc::new(
        ProfileStorage::with_path(config.profiles_path()?)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open profile storage: {}", e))?,
    );
    info!(
        "{} outstanding pairing codes, {} profiles",
        codes.len().await,
        profiles.len().await
    );

    let tokens = Arc::new(SignedTokenIssuer::new(
        config.token_secret.as_bytes().to_vec(),
        config.token_issuer.clone(),
        config.token_audience.clone(),
        config.token_ttl(),
    )?);

    let verifier = Arc::new(
        PairingVerifier::new(codes.clone(), profiles, tokens.clone())
            .with_issue_timeout(config.issue_timeout()),
    );

    // Start the expiry sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(codes)
        .with_interval(config.sweep_interval())
        .spawn(shutdown_rx);

    let addr = SocketAddr::new(config.bind, config.port);
    let router = create_router(Arc::new(AppState::new(config, verifier, tokens)));

    // Run server with graceful shutdown
    match (cert, key) {
        (Some(cert), Some(key)) => {
            info!("Loading TLS certificate from files...");
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create TLS config: {}", e))?;

            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();

            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down...");
                shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
            });

            info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
        (None, None) => {
            let shutdown = async {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down...");
            };

            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Listening on http://{}", addr);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
        _ => anyhow::bail!("--cert and --key must be given together"),
    }

    // Cleanup
    shutdown_tx.send(true).ok();
    sweeper.await.ok();

    info!("Goodbye!");
    Ok(())
}
