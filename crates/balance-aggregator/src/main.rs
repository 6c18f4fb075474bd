//! Main entry point for the balance aggregator

use anyhow::Context;
use balance_aggregator::{
    config::Config,
    server::{build_http_client, Server},
    telemetry, Aggregator, BalanceResult, Error, Result,
};
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "balance-aggregator",
    about = "Aggregates address balances from several providers",
    version,
    author
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long)]
    gen_config: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve,

    /// Look up addresses once and print those holding a balance
    Check {
        /// Addresses to look up
        addresses: Vec<String>,

        /// Read more addresses from a file, one per line
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Ask every provider instead of one provider per address
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle config generation
    if args.gen_config {
        let example_config = Config::generate_example()?;
        println!("{example_config}");
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    telemetry::init_tracing(args.debug, config.telemetry.json_logs);

    info!("Starting balance aggregator v{}", balance_aggregator::VERSION);

    if config.telemetry.enable_metrics {
        telemetry::install_metrics_exporter(config.telemetry.metrics_address)?;
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Check {
            addresses,
            file,
            all,
        } => check(config, addresses, file, all).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!(
        "Configuration loaded, binding to {}",
        config.server.bind_address
    );

    let server = Server::new(config).await?;

    match server.run().await {
        Ok(()) => {
            info!("Balance aggregator shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Balance aggregator error: {}", e);
            Err(e)
        }
    }
}

async fn check(
    config: Config,
    mut addresses: Vec<String>,
    file: Option<PathBuf>,
    all: bool,
) -> Result<()> {
    if let Some(path) = file {
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read address list {}", path.display()))?;
        addresses.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    if addresses.is_empty() {
        return Err(Error::InvalidRequest {
            message: "no addresses given".to_string(),
        });
    }

    let http_client = build_http_client(&config)?;
    let aggregator = Aggregator::from_config(&config, &http_client);
    if aggregator.is_empty() {
        return Err(Error::NoProvidersConfigured);
    }

    info!(count = addresses.len(), all, "Checking addresses");
    let results: Vec<BalanceResult> = if all {
        aggregator.get_balances(&addresses).await
    } else {
        stream::iter(&addresses)
            .map(|address| aggregator.get_balance_from_any(address))
            .buffer_unordered(config.aggregator.max_concurrent_addresses)
            .filter_map(|result| async move { result })
            .collect()
            .await
    };

    for result in results {
        if let Some(reason) = &result.error {
            warn!(provider = %result.source, address = %result.address, error = %reason, "Lookup failed");
        } else if result.has_funds() {
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    Ok(())
}
