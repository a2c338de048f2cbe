//! Storage wrapper that fails on demand.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use wallet_common::{Account, AccountId, Result, RowId, TransactionRecord, WalletError};
use wallet_ledger::storage::memory::MemoryTransaction;
use wallet_ledger::{MemoryStorage, Storage, StorageTransaction};

/// Storage step to fail at. Indexed steps fail on the n-th call (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Load(usize),
    Header,
    Action(usize),
    Balance(usize),
    Commit,
}

#[derive(Clone, Default)]
pub struct FailingStorage {
    inner: MemoryStorage,
    fail_at: Option<FailPoint>,
    fail_rollback: bool,
    fired: Arc<AtomicBool>,
    locked: Arc<Mutex<Vec<AccountId>>>,
    written: Arc<Mutex<Vec<AccountId>>>,
}

impl FailingStorage {
    pub fn new(inner: MemoryStorage, fail_at: Option<FailPoint>) -> Self {
        Self {
            inner,
            fail_at,
            ..Self::default()
        }
    }

    pub fn with_failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    /// Whether the injected failure was hit.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Accounts passed to `query_account_for_update`, in call order.
    pub fn locked(&self) -> Vec<AccountId> {
        self.locked.lock().clone()
    }

    /// Accounts passed to `update_account`, in call order.
    pub fn written(&self) -> Vec<AccountId> {
        self.written.lock().clone()
    }
}

pub struct FailingTransaction {
    inner: MemoryTransaction,
    fail_at: Option<FailPoint>,
    fail_rollback: bool,
    fired: Arc<AtomicBool>,
    locked: Arc<Mutex<Vec<AccountId>>>,
    written: Arc<Mutex<Vec<AccountId>>>,
    loads: usize,
    actions: usize,
    balances: usize,
}

impl FailingTransaction {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.fail_at == Some(point) {
            self.fired.store(true, Ordering::SeqCst);
            return Err(WalletError::storage("injected", format!("{point:?} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FailingStorage {
    type Transaction = FailingTransaction;

    async fn begin(&self) -> Result<FailingTransaction> {
        Ok(FailingTransaction {
            inner: self.inner.begin().await?,
            fail_at: self.fail_at,
            fail_rollback: self.fail_rollback,
            fired: self.fired.clone(),
            locked: self.locked.clone(),
            written: self.written.clone(),
            loads: 0,
            actions: 0,
            balances: 0,
        })
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.inner.list_accounts().await
    }

    async fn list_transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.inner.list_transactions().await
    }
}

#[async_trait]
impl StorageTransaction for FailingTransaction {
    async fn query_account_for_update(&mut self, id: &AccountId) -> Result<(Account, RowId)> {
        self.check(FailPoint::Load(self.loads))?;
        self.loads += 1;
        self.locked.lock().push(id.clone());
        self.inner.query_account_for_update(id).await
    }

    async fn upsert_account(&mut self, account: &Account) -> Result<()> {
        self.inner.upsert_account(account).await
    }

    async fn update_account(&mut self, account: &Account, row: RowId) -> Result<()> {
        self.check(FailPoint::Balance(self.balances))?;
        self.balances += 1;
        self.written.lock().push(account.id.clone());
        self.inner.update_account(account, row).await
    }

    async fn insert_transaction_header(
        &mut self,
        time: DateTime<Utc>,
        author: &str,
    ) -> Result<RowId> {
        self.check(FailPoint::Header)?;
        self.inner.insert_transaction_header(time, author).await
    }

    async fn insert_action(
        &mut self,
        account_row: RowId,
        transaction_row: RowId,
        volume: Decimal,
    ) -> Result<()> {
        self.check(FailPoint::Action(self.actions))?;
        self.actions += 1;
        self.inner.insert_action(account_row, transaction_row, volume).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.check(FailPoint::Commit)?;
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await?;
        if self.fail_rollback {
            return Err(WalletError::rollback("injected rollback failure"));
        }
        Ok(())
    }
}

/// Memory storage holding the given accounts.
pub async fn seeded(accounts: &[Account]) -> MemoryStorage {
    let storage = MemoryStorage::new();
    let mut trans = storage.begin().await.unwrap();
    for account in accounts {
        trans.upsert_account(account).await.unwrap();
    }
    trans.commit().await.unwrap();
    storage
}
