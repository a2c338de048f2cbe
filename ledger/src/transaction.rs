//! Ledger transaction: one business transaction applied atomically.
//!
//! The protocol is:
//!
//! 1. Deduplicate the referenced accounts and sort them by
//!    `(currency, identifier)`.
//! 2. Lock and load every account in that order. The first failure aborts,
//!    so no lock past the failing row is taken.
//! 3. Run the policy callback over the loaded accounts only.
//! 4. Persist the transaction header and one action row per balance action.
//! 5. Persist each loaded account once, with its accumulated balance.
//! 6. Commit.
//!
//! Any failure after the storage transaction was opened rolls it back before
//! the error is returned.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::Utc;
use tracing::{debug, error, warn};

use wallet_common::{Account, AccountId, BusinessTransaction, Result, RowId, WalletError};

use crate::metrics::LedgerMetrics;
use crate::storage::StorageTransaction;

/// Accounts visible to a policy callback.
///
/// Only accounts locked by the running ledger transaction are reachable.
pub trait AccountAccess {
    /// Read a loaded account.
    fn account(&self, id: &AccountId) -> Result<&Account>;

    /// Modify a loaded account. Changes are persisted only if the whole
    /// ledger transaction commits.
    fn account_mut(&mut self, id: &AccountId) -> Result<&mut Account>;
}

/// Lifecycle of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerPhase {
    /// Storage transaction is open, nothing is locked yet.
    Opened,
    /// Locking and loading account rows.
    Loading,
    /// Policy callback is running.
    Validating,
    /// Writing the record and balances.
    Persisting,
    /// Committed.
    Committed,
    /// Rolled back after a failure.
    Aborted,
}

impl LedgerPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LedgerPhase::Committed | LedgerPhase::Aborted)
    }
}

impl fmt::Display for LedgerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedgerPhase::Opened => "opened",
            LedgerPhase::Loading => "loading",
            LedgerPhase::Validating => "validating",
            LedgerPhase::Persisting => "persisting",
            LedgerPhase::Committed => "committed",
            LedgerPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Order in which the accounts of `trans` are locked.
///
/// Each account appears once. The order depends only on the set of accounts,
/// never on the order of the actions.
pub fn lock_order(trans: &BusinessTransaction) -> Vec<AccountId> {
    trans
        .accounts()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug)]
struct LoadedAccount {
    account: Account,
    row: RowId,
}

/// One business transaction in progress over a storage transaction.
pub struct LedgerTransaction<'m, T> {
    storage: T,
    accounts: HashMap<AccountId, LoadedAccount>,
    order: Vec<AccountId>,
    phase: LedgerPhase,
    metrics: &'m LedgerMetrics,
}

impl<'m, T: StorageTransaction> LedgerTransaction<'m, T> {
    /// Wrap a freshly opened storage transaction.
    pub fn open(storage: T, metrics: &'m LedgerMetrics) -> Self {
        Self {
            storage,
            accounts: HashMap::new(),
            order: Vec::new(),
            phase: LedgerPhase::Opened,
            metrics,
        }
    }

    pub fn phase(&self) -> LedgerPhase {
        self.phase
    }

    /// Accounts locked so far, in lock order.
    pub fn locked_accounts(&self) -> &[AccountId] {
        &self.order
    }

    fn enter(&mut self, phase: LedgerPhase) {
        debug!(from = %self.phase, to = %phase, "Ledger transaction phase");
        self.phase = phase;
    }

    /// Run the whole protocol for `trans`, letting `policy` validate and
    /// mutate the loaded accounts.
    ///
    /// On failure the storage transaction is rolled back and the original
    /// error is returned. If the rollback itself fails, the rollback error is
    /// returned instead since it is the fatal one.
    pub async fn execute<F>(
        mut self,
        trans: &BusinessTransaction,
        author: &str,
        policy: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut dyn AccountAccess) -> Result<()> + Send,
    {
        match self.apply(trans, author, policy).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.abort(err).await),
        }
    }

    async fn apply<F>(&mut self, trans: &BusinessTransaction, author: &str, policy: F) -> Result<()>
    where
        F: FnOnce(&mut dyn AccountAccess) -> Result<()> + Send,
    {
        self.load(trans).await?;

        self.enter(LedgerPhase::Validating);
        policy(self)?;

        self.enter(LedgerPhase::Persisting);
        self.store_transaction(trans, author).await?;
        self.store_balances().await?;
        self.storage.commit().await?;

        self.enter(LedgerPhase::Committed);
        Ok(())
    }

    /// Lock and load each referenced account once, in lock order.
    pub async fn load(&mut self, trans: &BusinessTransaction) -> Result<()> {
        self.enter(LedgerPhase::Loading);

        for id in lock_order(trans) {
            let (account, row) = self.storage.query_account_for_update(&id).await?;
            self.metrics.row_locked();
            debug!(account = %id, row = %row, "Account locked");
            self.accounts.insert(id.clone(), LoadedAccount { account, row });
            self.order.push(id);
        }
        Ok(())
    }

    async fn store_transaction(&mut self, trans: &BusinessTransaction, author: &str) -> Result<()> {
        let header = self
            .storage
            .insert_transaction_header(Utc::now(), author)
            .await?;

        for action in trans.actions() {
            let row = self
                .accounts
                .get(&action.account)
                .map(|loaded| loaded.row)
                .ok_or_else(|| WalletError::NotPrefetched(action.account.clone()))?;
            self.storage.insert_action(row, header, action.volume).await?;
        }
        Ok(())
    }

    async fn store_balances(&mut self) -> Result<()> {
        for id in &self.order {
            if let Some(loaded) = self.accounts.get(id) {
                self.storage
                    .update_account(&loaded.account, loaded.row)
                    .await?;
            }
        }
        Ok(())
    }

    async fn abort(&mut self, err: WalletError) -> WalletError {
        let failed_in = self.phase;
        self.enter(LedgerPhase::Aborted);
        self.accounts.clear();

        let err = rollback(&mut self.storage, err).await;
        if !err.is_fatal() {
            warn!(phase = %failed_in, error = %err, "Ledger transaction aborted");
        }
        err
    }
}

impl<T> AccountAccess for LedgerTransaction<'_, T> {
    fn account(&self, id: &AccountId) -> Result<&Account> {
        self.accounts
            .get(id)
            .map(|loaded| &loaded.account)
            .ok_or_else(|| WalletError::NotPrefetched(id.clone()))
    }

    fn account_mut(&mut self, id: &AccountId) -> Result<&mut Account> {
        self.accounts
            .get_mut(id)
            .map(|loaded| &mut loaded.account)
            .ok_or_else(|| WalletError::NotPrefetched(id.clone()))
    }
}

/// Roll `storage` back after `err` and return the error to report.
///
/// A failed rollback wins over `err`: the caller must learn that the session
/// is broken. `err` is logged so it is not lost.
pub(crate) async fn rollback<T: StorageTransaction>(
    storage: &mut T,
    err: WalletError,
) -> WalletError {
    match storage.rollback().await {
        Ok(()) => err,
        Err(rollback_err) => {
            error!(
                error = %err,
                rollback_error = %rollback_err,
                "Rollback failed, storage session state is undefined"
            );
            rollback_err
        }
    }
}
