//! # wsync
//!
//! Mirror a local directory tree onto a remote peer.
//!
//! ## Example
//!
//! ```bash
//! # On the mirror: wait for the workstation and apply its changes
//! wsync --endpoint remote
//!
//! # On the workstation: watch ./ and push every change
//! wsync --endpoint local --config wsync.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use sync_engine::Config;
use tracing_subscriber::EnvFilter;

/// Mirror a local directory tree onto a remote peer.
#[derive(Parser, Debug)]
#[command(name = "wsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Which end of the session to run
    #[arg(long, value_enum, default_value_t = Endpoint::Local)]
    endpoint: Endpoint,

    /// Configuration file (defaults to ./wsync.toml if present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    /// Watch the configured roots and push changes
    Local,
    /// Accept the handshake and apply incoming changes
    Remote,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.endpoint {
        Endpoint::Local => {
            sync_engine::run_local(&config)
                .await
                .context("Local endpoint failed")?;
        }
        Endpoint::Remote => {
            let received = sync_engine::run_remote(&config)
                .await
                .context("Remote endpoint failed")?;
            tracing::info!("Session finished, {} events received", received);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn endpoint_defaults_to_local() {
        let cli = Cli::try_parse_from(["wsync"]).unwrap();
        assert_eq!(cli.endpoint, Endpoint::Local);
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_remote_with_config() {
        let cli =
            Cli::try_parse_from(["wsync", "--endpoint", "remote", "--config", "m.toml", "-v"])
                .unwrap();
        assert_eq!(cli.endpoint, Endpoint::Remote);
        assert_eq!(cli.config, Some(PathBuf::from("m.toml")));
        assert!(cli.verbose);
    }

    #[test]
    fn rejects_unknown_endpoint() {
        assert!(Cli::try_parse_from(["wsync", "--endpoint", "both"]).is_err());
    }
}
