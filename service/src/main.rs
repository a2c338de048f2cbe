//! Wallet command line tool
//!
//! Runs one wallet operation against PostgreSQL and prints the result as JSON.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wallet_common::{AccountId, BalanceAction, WalletError};
use wallet_ledger::PgStorage;
use wallet_service::{LogFormat, ServiceConfig, WalletService};

/// Exit code for failures that leave the storage session untrusted.
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "wallet", about = "Wallet ledger command line tool")]
struct Args {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the wallet tables if they do not exist
    InitSchema,
    /// Create an account with zero balance
    CreateAccount {
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "USD")]
        currency: String,
    },
    /// Change an account balance without restrictions
    Adjust {
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, allow_hyphen_values = true)]
        amount: Decimal,
    },
    /// Transfer funds between two accounts
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        amount: Decimal,
    },
    /// List all accounts
    Accounts,
    /// List all committed transactions
    History,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = ServiceConfig::from_env();
    if let Some(url) = args.database_url.clone() {
        config.database.url = url;
    }
    if args.json_logs {
        config.log_format = LogFormat::Json;
    }

    init_logging(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(WalletError::Configuration(e).into());
    }

    info!(command = ?args.command, "Running wallet command");
    let storage = PgStorage::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout,
    )
    .await?;

    if let Command::InitSchema = args.command {
        storage.ensure_schema().await?;
        return Ok(ExitCode::SUCCESS);
    }

    let service = WalletService::new(storage);
    match run(&service, args.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) if err.downcast_ref::<WalletError>().is_some_and(WalletError::is_fatal) => {
            error!(error = %err, "Aborting after fatal error");
            Ok(ExitCode::from(EXIT_FATAL))
        }
        Err(err) => Err(err),
    }
}

async fn run(service: &WalletService<PgStorage>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::InitSchema => Ok(()),
        Command::CreateAccount { id, currency } => {
            let id = AccountId::new(id, currency);
            service.create_account(id.clone()).await?;
            print_json(&id)
        }
        Command::Adjust {
            id,
            currency,
            amount,
        } => {
            let action = BalanceAction::new(AccountId::new(id, currency), amount);
            let account = service.adjust_balance(action).await?;
            print_json(&account)
        }
        Command::Transfer {
            from,
            to,
            currency,
            amount,
        } => {
            let accounts = service.transfer(&from, &to, &currency, amount).await?;
            print_json(&accounts)
        }
        Command::Accounts => print_json(&service.accounts().await?),
        Command::History => print_json(&service.payments().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(config: &ServiceConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}
