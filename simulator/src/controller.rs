//! Simulation controller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::ensure;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use wallet_common::{AccountId, BalanceAction, ErrorKind};
use wallet_ledger::MemoryStorage;
use wallet_service::WalletService;

use crate::metrics::SimulationMetrics;

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub accounts: usize,
    pub transfers: usize,
    pub workers: usize,
    pub initial_balance: Decimal,
    pub max_amount: u64,
    pub currency: String,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            accounts: 10,
            transfers: 1000,
            workers: 8,
            initial_balance: Decimal::from(1000),
            max_amount: 500,
            currency: "USD".to_string(),
            seed: None,
        }
    }
}

/// One planned transfer, by account index.
#[derive(Debug, Clone, Copy)]
struct PlannedTransfer {
    from: usize,
    to: usize,
    amount: Decimal,
}

/// Outcome of a finished simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub accounts: usize,
    pub total_transfers: u64,
    pub successful_transfers: u64,
    pub rejected_transfers: u64,
    pub failed_transfers: u64,
    pub success_rate: f64,
    pub throughput_per_sec: f64,
    pub average_latency_us: u64,
    pub p50_latency_us: u64,
    pub p99_latency_us: u64,
    pub funded_total: Decimal,
    pub final_total: Decimal,
    pub elapsed_ms: u128,
}

/// Controls the simulation.
pub struct SimulationController {
    config: SimulationConfig,
    /// Random number generator, seeded when a seed is configured.
    rng: StdRng,
    service: Arc<WalletService<MemoryStorage>>,
    accounts: Vec<AccountId>,
    metrics: Arc<Mutex<SimulationMetrics>>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            rng,
            service: Arc::new(WalletService::new(MemoryStorage::new())),
            accounts: Vec::new(),
            metrics: Arc::new(Mutex::new(SimulationMetrics::new())),
        }
    }

    pub fn service(&self) -> &Arc<WalletService<MemoryStorage>> {
        &self.service
    }

    /// Create and fund the accounts through the manager path.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        ensure!(self.config.accounts >= 2, "need at least two accounts");
        ensure!(self.config.max_amount >= 1, "max amount must be positive");
        ensure!(
            self.config.initial_balance >= Decimal::ZERO,
            "initial balance cannot be negative"
        );
        info!(accounts = self.config.accounts, "Initializing simulation");

        for n in 0..self.config.accounts {
            let id = AccountId::new(format!("account-{n:04}"), self.config.currency.clone());
            self.service.create_account(id.clone()).await?;
            self.service
                .adjust_balance(BalanceAction::new(id.clone(), self.config.initial_balance))
                .await?;
            self.accounts.push(id);
        }

        info!(
            accounts = self.accounts.len(),
            balance = %self.config.initial_balance,
            "Accounts funded"
        );
        Ok(())
    }

    /// Draw the transfer plan from the generator. The plan depends only on
    /// the seed; the interleaving of its execution does not.
    fn plan(&mut self) -> Vec<PlannedTransfer> {
        let count = self.accounts.len();
        (0..self.config.transfers)
            .map(|_| {
                let from = self.rng.gen_range(0..count);
                let mut to = self.rng.gen_range(0..count);
                while to == from {
                    to = self.rng.gen_range(0..count);
                }
                let amount = Decimal::from(self.rng.gen_range(1..=self.config.max_amount));
                PlannedTransfer { from, to, amount }
            })
            .collect()
    }

    /// Run the planned transfers across the worker tasks and verify the
    /// final balances.
    pub async fn run(&mut self) -> anyhow::Result<SimulationReport> {
        ensure!(!self.accounts.is_empty(), "simulation is not initialized");

        let plan = Arc::new(self.plan());
        let next = Arc::new(AtomicUsize::new(0));
        let accounts = Arc::new(self.accounts.clone());
        let start = Instant::now();

        info!(
            transfers = plan.len(),
            workers = self.config.workers,
            "Running simulation"
        );

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker in 0..self.config.workers.max(1) {
            let plan = plan.clone();
            let next = next.clone();
            let accounts = accounts.clone();
            let service = self.service.clone();
            let metrics = self.metrics.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(transfer) = plan.get(index) else {
                        break;
                    };
                    let from = &accounts[transfer.from];
                    let to = &accounts[transfer.to];

                    let started = Instant::now();
                    let result = service
                        .transfer(&from.identifier, &to.identifier, &from.currency, transfer.amount)
                        .await;

                    match result {
                        Ok(_) => metrics.lock().record_success(started.elapsed()),
                        Err(err) if err.kind() == ErrorKind::PolicyViolation => {
                            debug!(worker, error = %err, "Transfer rejected");
                            metrics.lock().record_rejection();
                        }
                        Err(err) => {
                            warn!(worker, error = %err, "Transfer failed");
                            metrics.lock().record_failure();
                            if err.is_fatal() {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        for handle in handles {
            handle.await?;
        }

        self.report(start.elapsed()).await
    }

    /// Check conservation and non-negative balances, then summarize.
    async fn report(&self, elapsed: Duration) -> anyhow::Result<SimulationReport> {
        let accounts = self.service.accounts().await?;
        let funded_total = self.config.initial_balance * Decimal::from(self.accounts.len());
        let final_total: Decimal = accounts.iter().map(|account| account.balance).sum();

        ensure!(
            final_total == funded_total,
            "balance total changed from {funded_total} to {final_total}"
        );
        if let Some(account) = accounts.iter().find(|account| account.balance < Decimal::ZERO) {
            anyhow::bail!("account {} went negative: {}", account.id, account.balance);
        }

        let metrics = self.metrics.lock().clone();
        let report = SimulationReport {
            accounts: accounts.len(),
            total_transfers: metrics.total_transfers,
            successful_transfers: metrics.successful_transfers,
            rejected_transfers: metrics.rejected_transfers,
            failed_transfers: metrics.failed_transfers,
            success_rate: metrics.success_rate(),
            throughput_per_sec: metrics.throughput(elapsed),
            average_latency_us: metrics.average_latency_us(),
            p50_latency_us: metrics.p50_latency_us(),
            p99_latency_us: metrics.p99_latency_us(),
            funded_total,
            final_total,
            elapsed_ms: elapsed.as_millis(),
        };

        info!(
            total = report.total_transfers,
            successful = report.successful_transfers,
            rejected = report.rejected_transfers,
            failed = report.failed_transfers,
            "Simulation complete, balances conserved"
        );
        Ok(report)
    }
}
