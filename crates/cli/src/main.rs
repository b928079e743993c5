//! Inkwell CLI for session signing keys and tokens.
//!
//! This tool provides commands for:
//! - Rotating, listing, inspecting and retiring signing keys
//! - Publishing the public verification keys as a JWK set
//! - Issuing and verifying session tokens by hand
//!
//! The key store is selected by the TOML configuration file; see
//! `inkwell_auth::settings` for the format and `INKWELL__` overrides.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use inkwell_auth::logging::{init_logging, is_debug_enabled};
use inkwell_auth::settings::Settings;
use uuid::Uuid;

mod error;
mod keys;
mod token;

use error::CliError;

#[derive(Parser)]
#[command(name = "inkctl")]
#[command(about = "Inkwell CLI for session key rotation and token inspection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(
        long,
        short,
        global = true,
        env = "INKWELL_CONFIG",
        default_value = "inkwell.toml"
    )]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Signing key management
    Keys {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Session token tools
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Generate a new signing key and make it current
    Generate {
        /// Key name (default: creation timestamp)
        #[arg(long)]
        name: Option<String>,
    },
    /// List signing keys, newest first
    List,
    /// Show one signing key's public half
    Show { name: String },
    /// Delete a signing key
    Delete { name: String },
    /// Delete all but the most recent keys
    Retire {
        /// Number of most recent keys to keep
        #[arg(long, default_value_t = 2)]
        keep: usize,
    },
    /// Print the public keys as a JWK set
    Jwks,
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue a session token signed with the current key
    Issue {
        /// User the token authenticates
        #[arg(long)]
        user_id: Uuid,

        /// Token lifetime (default: session.ttl_seconds)
        #[arg(long)]
        ttl_seconds: Option<i64>,
    },
    /// Verify a session token against the trusted key window
    Verify { token: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            if is_debug_enabled() {
                eprintln!("Error: {:?}", e);
            } else {
                eprintln!("Error: {}", e);
            }
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<String, CliError> {
    let settings = Settings::from_file(&cli.config)?;
    let repository = settings.key_store.open_repository()?;
    let repository = repository.as_ref();
    let now = Utc::now();

    if cli.verbose {
        log::debug!(
            "Using {:?} key store with prefix '{}'",
            settings.key_store.backend,
            settings.key_store.prefix
        );
    }

    match cli.command {
        Commands::Keys { action } => match action {
            KeyAction::Generate { name } => keys::generate(repository, name.as_deref(), now).await,
            KeyAction::List => keys::list(repository).await,
            KeyAction::Show { name } => keys::show(repository, &name).await,
            KeyAction::Delete { name } => keys::delete(repository, &name).await,
            KeyAction::Retire { keep } => keys::retire(repository, keep).await,
            KeyAction::Jwks => keys::jwks(repository).await,
        },
        Commands::Token { action } => match action {
            TokenAction::Issue {
                user_id,
                ttl_seconds,
            } => {
                let ttl = match ttl_seconds {
                    Some(secs) => token::ttl_argument(secs)?,
                    None => settings.session.ttl()?,
                };
                token::issue(repository, user_id, ttl, now).await
            }
            TokenAction::Verify { token } => {
                token::verify(repository, &token, settings.session.trusted_window, now).await
            }
        },
    }
}
