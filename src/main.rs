//! sso-client - command line front end for the auth service client.
//!
//! Asks the auth service whether a user is an administrator and prints the
//! answer. Settings come from an optional TOML file, overridden by flags and
//! their environment variables.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sso_client::config::{AppConfig, ClientConfig, LoggingConfig};
use sso_client::{logging, AuthServiceClient, CallContext, TracingSink};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SSO_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address of the auth service (host:port)
    #[arg(short, long, env = "SSO_ADDRESS")]
    address: Option<String>,

    /// Dial timeout and per-attempt timeout in milliseconds
    #[arg(short, long, env = "SSO_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Retries after the first attempt for transient failures
    #[arg(short, long, env = "SSO_RETRIES")]
    retries: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a user has administrator rights
    IsAdmin {
        /// Numeric user id
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },
}

impl Cli {
    /// Merge the configuration file with command line overrides
    fn resolve(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => {
                let address = self
                    .address
                    .clone()
                    .context("an address is required (--address or SSO_ADDRESS)")?;
                AppConfig {
                    sso: ClientConfig::new(address),
                    logging: LoggingConfig::default(),
                }
            }
        };

        if let Some(address) = &self.address {
            config.sso.address = address.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.sso.timeout_ms = timeout_ms;
        }
        if let Some(retries) = self.retries {
            config.sso.retries_count = retries;
        }
        if self.debug {
            config.logging.verbose = true;
        }

        config.sso.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve()?;

    logging::init_logging(&config.logging).context("initializing logging")?;
    debug!(?config, "resolved configuration");

    let sink = Arc::new(TracingSink::current());
    let client = AuthServiceClient::connect_with(sink, &config.sso)
        .await
        .context("connecting to auth service")?;

    let ctx = CallContext::new();
    let cancel = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, cancelling request");
            cancel.cancel();
        }
    });

    match cli.command {
        Command::IsAdmin { user_id } => {
            let is_admin = client
                .is_admin(&ctx, user_id)
                .await
                .with_context(|| format!("checking admin rights of user {}", user_id))?;
            println!("{}", is_admin);
        }
    }

    Ok(())
}
