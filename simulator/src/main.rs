//! Wallet Simulator
//!
//! Runs seeded concurrent transfers against an in-memory ledger and checks
//! that no money is created or lost.

use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;

use controller::{SimulationConfig, SimulationController};

/// Wallet Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "wallet-simulator")]
#[command(about = "Concurrent transfer simulation for the wallet ledger")]
struct Args {
    /// Number of accounts to create
    #[arg(short, long, default_value = "10")]
    accounts: usize,

    /// Number of transfers to run
    #[arg(short, long, default_value = "1000")]
    transfers: usize,

    /// Concurrent worker tasks
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Initial balance of every account
    #[arg(long, default_value = "1000")]
    initial_balance: Decimal,

    /// Largest transfer amount
    #[arg(long, default_value = "500")]
    max_amount: u64,

    /// Currency of all accounts
    #[arg(long, default_value = "USD")]
    currency: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Print counters in Prometheus format after the report
    #[arg(long)]
    prometheus: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!(
        accounts = args.accounts,
        transfers = args.transfers,
        workers = args.workers,
        "Starting wallet simulator"
    );

    let mut controller = SimulationController::new(SimulationConfig {
        accounts: args.accounts,
        transfers: args.transfers,
        workers: args.workers,
        initial_balance: args.initial_balance,
        max_amount: args.max_amount,
        currency: args.currency,
        seed: args.seed,
    });

    controller.initialize().await?;
    let report = controller.run().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.prometheus {
        let service = controller.service();
        let ledger = service.repository().metrics().snapshot();
        print!("{}", service.metrics().to_prometheus(&ledger));
    }

    Ok(())
}
