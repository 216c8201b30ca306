use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use helpdesk_gateway::{config::Config, gateway, rag};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "helpdesk-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. `info`, `helpdesk_gateway=debug`); `RUST_LOG` wins when set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Listen address (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the normalized lookup key for a query
    Normalize { text: String },

    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Normalize { text } => {
            println!("{}", rag::normalize(&text));
            Ok(())
        }
        Commands::Config => {
            let config = Config::load(cli.config.as_deref())?;
            print!("{}", config.to_redacted_toml()?);
            Ok(())
        }
        Commands::Serve { host, port } => {
            let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            gateway::run_gateway(&host, port, config).await
        }
    }
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
    fn serve_accepts_overrides() {
        let cli = Cli::try_parse_from(["helpdesk-gateway", "--config", "gw.toml", "serve", "--port", "8080"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("gw.toml")));
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(8080));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
