//! In-process storage driver.
//!
//! Each account row carries its own async mutex. A [`MemoryTransaction`]
//! keeps the owned guards of the rows it locked until it commits or rolls
//! back, so concurrent ledger transactions block on each other exactly like
//! `SELECT ... FOR UPDATE` does in PostgreSQL. Writes are staged in the
//! transaction and applied under one state write-lock on commit, so readers
//! never observe a half-applied transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use wallet_common::{
    Account, AccountId, BalanceAction, Result, RowId, TransactionRecord, WalletError,
};

use super::{Storage, StorageTransaction};

#[derive(Debug)]
struct AccountRow {
    row: RowId,
    account: Account,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone)]
struct HeaderRow {
    row: RowId,
    time: DateTime<Utc>,
    author: String,
}

#[derive(Debug, Clone)]
struct ActionRow {
    account_row: RowId,
    transaction_row: RowId,
    volume: Decimal,
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<AccountRow>,
    by_id: HashMap<AccountId, usize>,
    by_row: HashMap<RowId, usize>,
    headers: Vec<HeaderRow>,
    actions: Vec<ActionRow>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    next_row: AtomicI64,
}

impl Inner {
    /// Row ids are never reused, including ids of rolled back inserts.
    fn allocate_row(&self) -> RowId {
        RowId::new(self.next_row.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// In-memory storage with row-level locks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        Ok(MemoryTransaction {
            inner: self.inner.clone(),
            guards: HashMap::new(),
            updates: HashMap::new(),
            inserts: Vec::new(),
            headers: Vec::new(),
            actions: Vec::new(),
            finished: false,
        })
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let state = self.inner.state.read();
        Ok(state.accounts.iter().map(|row| row.account.clone()).collect())
    }

    async fn list_transactions(&self) -> Result<Vec<TransactionRecord>> {
        let state = self.inner.state.read();

        let mut records: Vec<TransactionRecord> = state
            .headers
            .iter()
            .map(|header| TransactionRecord {
                id: header.row,
                timestamp: header.time,
                author: header.author.clone(),
                actions: Vec::new(),
            })
            .collect();
        let positions: HashMap<RowId, usize> = records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id, position))
            .collect();

        for action in &state.actions {
            let (Some(&position), Some(&account)) = (
                positions.get(&action.transaction_row),
                state.by_row.get(&action.account_row),
            ) else {
                continue;
            };
            records[position].actions.push(BalanceAction::new(
                state.accounts[account].account.id.clone(),
                action.volume,
            ));
        }

        Ok(records)
    }
}

/// Open transaction on [`MemoryStorage`].
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    guards: HashMap<RowId, OwnedMutexGuard<()>>,
    updates: HashMap<RowId, Decimal>,
    inserts: Vec<Account>,
    headers: Vec<HeaderRow>,
    actions: Vec<ActionRow>,
    finished: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.finished {
            return Err(WalletError::storage(operation, "transaction already finished"));
        }
        Ok(())
    }

    /// Take the row lock unless this transaction already holds it.
    async fn lock_row(&mut self, row: RowId, lock: Arc<Mutex<()>>) {
        if self.guards.contains_key(&row) {
            return;
        }
        let guard = lock.lock_owned().await;
        debug!(row = %row, "Row locked");
        self.guards.insert(row, guard);
    }

    fn find_row(&self, id: &AccountId) -> Option<(RowId, Arc<Mutex<()>>)> {
        let state = self.inner.state.read();
        state.by_id.get(id).map(|&index| {
            let row = &state.accounts[index];
            (row.row, row.lock.clone())
        })
    }

    fn release(&mut self) {
        self.updates.clear();
        self.inserts.clear();
        self.headers.clear();
        self.actions.clear();
        self.guards.clear();
        self.finished = true;
    }
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn query_account_for_update(&mut self, id: &AccountId) -> Result<(Account, RowId)> {
        self.ensure_open("query_account_for_update")?;

        let (row, lock) = self
            .find_row(id)
            .ok_or_else(|| WalletError::AccountNotFound(id.clone()))?;
        self.lock_row(row, lock).await;

        // Read after locking so the balance is the latest committed one.
        let committed = {
            let state = self.inner.state.read();
            state
                .by_row
                .get(&row)
                .map(|&index| state.accounts[index].account.balance)
        };
        let balance = self
            .updates
            .get(&row)
            .copied()
            .or(committed)
            .ok_or_else(|| WalletError::AccountNotFound(id.clone()))?;

        Ok((Account::new(id.clone(), balance), row))
    }

    async fn upsert_account(&mut self, account: &Account) -> Result<()> {
        self.ensure_open("upsert_account")?;

        match self.find_row(&account.id) {
            Some((row, lock)) => {
                self.lock_row(row, lock).await;
                self.updates.insert(row, account.balance);
            }
            None => {
                self.inserts.retain(|pending| pending.id != account.id);
                self.inserts.push(account.clone());
            }
        }
        Ok(())
    }

    async fn update_account(&mut self, account: &Account, row: RowId) -> Result<()> {
        self.ensure_open("update_account")?;

        if !self.guards.contains_key(&row) {
            return Err(WalletError::storage(
                "update_account",
                format!("row {} of account {} is not locked", row, account.id),
            ));
        }
        self.updates.insert(row, account.balance);
        Ok(())
    }

    async fn insert_transaction_header(
        &mut self,
        time: DateTime<Utc>,
        author: &str,
    ) -> Result<RowId> {
        self.ensure_open("insert_transaction_header")?;

        let row = self.inner.allocate_row();
        self.headers.push(HeaderRow {
            row,
            time,
            author: author.to_string(),
        });
        Ok(row)
    }

    async fn insert_action(
        &mut self,
        account_row: RowId,
        transaction_row: RowId,
        volume: Decimal,
    ) -> Result<()> {
        self.ensure_open("insert_action")?;

        let account_known = self.inner.state.read().by_row.contains_key(&account_row);
        if !account_known {
            return Err(WalletError::storage(
                "insert_action",
                format!("account row {} does not exist", account_row),
            ));
        }
        if !self.headers.iter().any(|header| header.row == transaction_row) {
            return Err(WalletError::storage(
                "insert_action",
                format!("transaction row {} does not exist", transaction_row),
            ));
        }

        self.actions.push(ActionRow {
            account_row,
            transaction_row,
            volume,
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open("commit")?;

        {
            let mut guard = self.inner.state.write();
            let state = &mut *guard;

            for (row, balance) in &self.updates {
                if let Some(&index) = state.by_row.get(row) {
                    state.accounts[index].account.balance = *balance;
                }
            }

            for account in self.inserts.drain(..) {
                // Another transaction may have created the row meanwhile.
                if let Some(&index) = state.by_id.get(&account.id) {
                    state.accounts[index].account.balance = account.balance;
                    continue;
                }
                let row = self.inner.allocate_row();
                let index = state.accounts.len();
                state.by_id.insert(account.id.clone(), index);
                state.by_row.insert(row, index);
                state.accounts.push(AccountRow {
                    row,
                    account,
                    lock: Arc::new(Mutex::new(())),
                });
            }

            state.headers.extend(self.headers.drain(..));
            state.actions.extend(self.actions.drain(..));
        }

        self.release();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.finished {
            self.release();
        }
        Ok(())
    }
}
