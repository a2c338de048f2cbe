//! Storage contract consumed by the ledger.
//!
//! A [`Storage`] is a driver holding its connection (pool) for its whole
//! lifetime. Every ledger operation opens one [`StorageTransaction`] from it
//! and owns that handle exclusively until commit or rollback.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use wallet_common::{Account, AccountId, Result, RowId, TransactionRecord};

/// Storage driver.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Transaction handle type issued by [`Storage::begin`].
    type Transaction: StorageTransaction;

    /// Start a new storage transaction.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Committed state of all accounts.
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// All committed business transactions, oldest first.
    async fn list_transactions(&self) -> Result<Vec<TransactionRecord>>;
}

/// One open storage transaction.
///
/// All writes become visible to others only after [`commit`]. Dropping an
/// unfinished transaction discards its writes and releases its row locks.
///
/// [`commit`]: StorageTransaction::commit
#[async_trait]
pub trait StorageTransaction: Send {
    /// Load an account and take its row write lock until the transaction
    /// finishes. Blocks while another transaction holds the lock.
    async fn query_account_for_update(&mut self, id: &AccountId) -> Result<(Account, RowId)>;

    /// Insert the account, or overwrite the balance of an existing one.
    async fn upsert_account(&mut self, account: &Account) -> Result<()>;

    /// Write the balance of a row locked by this transaction.
    async fn update_account(&mut self, account: &Account, row: RowId) -> Result<()>;

    /// Insert a business transaction header and return its row handle.
    async fn insert_transaction_header(
        &mut self,
        time: DateTime<Utc>,
        author: &str,
    ) -> Result<RowId>;

    /// Insert one applied action referencing an account row and a header row.
    async fn insert_action(
        &mut self,
        account_row: RowId,
        transaction_row: RowId,
        volume: Decimal,
    ) -> Result<()>;

    /// Commit all writes. Fails once the transaction has finished, so a
    /// rolled back transaction never reports a commit.
    async fn commit(&mut self) -> Result<()>;

    /// Discard all writes. No-op once the transaction has finished.
    ///
    /// A failure here is fatal: it is reported as
    /// [`WalletError::RollbackFailed`](wallet_common::WalletError::RollbackFailed).
    async fn rollback(&mut self) -> Result<()>;
}
