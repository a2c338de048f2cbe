//! Account repository.

use std::sync::Arc;

use tracing::{info, instrument};

use wallet_common::{
    Account, BusinessTransaction, ErrorKind, Result, TransactionRecord,
};

use crate::metrics::LedgerMetrics;
use crate::storage::{Storage, StorageTransaction};
use crate::transaction::{rollback, AccountAccess, LedgerTransaction};

/// Entry point to the ledger over one storage driver.
///
/// The repository keeps no state between calls besides the driver and the
/// counters; every call opens its own storage transaction.
pub struct Repository<S> {
    storage: S,
    metrics: Arc<LedgerMetrics>,
}

impl<S: Storage> Repository<S> {
    pub fn new(storage: S) -> Self {
        Self::with_metrics(storage, Arc::new(LedgerMetrics::new()))
    }

    pub fn with_metrics(storage: S, metrics: Arc<LedgerMetrics>) -> Self {
        Self { storage, metrics }
    }

    pub fn metrics(&self) -> &Arc<LedgerMetrics> {
        &self.metrics
    }

    /// Store an account unconditionally: insert it, or overwrite the balance
    /// of the existing account with the same ID.
    #[instrument(skip(self, account), fields(account = %account.id))]
    pub async fn add_account(&self, account: Account) -> Result<()> {
        let mut trans = self.storage.begin().await?;

        let stored = match trans.upsert_account(&account).await {
            Ok(()) => trans.commit().await,
            Err(err) => Err(err),
        };
        if let Err(err) = stored {
            return Err(rollback(&mut trans, err).await);
        }

        self.metrics.account_stored();
        info!(balance = %account.balance, "Account stored");
        Ok(())
    }

    /// Apply `trans` atomically.
    ///
    /// Locks every referenced account, hands the loaded accounts to
    /// `policy`, and persists the result under `author` if `policy`
    /// succeeds. Nothing is persisted otherwise.
    #[instrument(skip(self, trans, policy), fields(actions = trans.len()))]
    pub async fn modify<F>(
        &self,
        trans: &BusinessTransaction,
        author: &str,
        policy: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut dyn AccountAccess) -> Result<()> + Send,
    {
        let storage = self.storage.begin().await?;
        self.metrics.transaction_opened();

        let result = LedgerTransaction::open(storage, &self.metrics)
            .execute(trans, author, policy)
            .await;

        match &result {
            Ok(()) => self.metrics.transaction_committed(),
            Err(err) => {
                self.metrics.transaction_aborted();
                if err.kind() == ErrorKind::PolicyViolation {
                    self.metrics.policy_rejected();
                }
            }
        }
        result
    }

    /// Committed state of all accounts.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.storage.list_accounts().await
    }

    /// All committed business transactions, oldest first.
    pub async fn transaction_history(&self) -> Result<Vec<TransactionRecord>> {
        self.storage.list_transactions().await
    }
}
