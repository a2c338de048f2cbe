//! PostgreSQL storage driver.
//!
//! ## Schema
//!
//! | relation | columns |
//! |----------|---------|
//! | `account` | `id`, `name`, `currency`, `balance`; unique on `(name, currency)` |
//! | `business_transaction` | `id`, `time`, `author` |
//! | `balance_action` | `id`, `account` → `account.id`, `trans` → `business_transaction.id`, `volume` |
//!
//! Row locks are taken with `SELECT ... FOR UPDATE` and held by the
//! surrounding database transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use tracing::{info, instrument};

use wallet_common::{
    Account, AccountId, BalanceAction, Result, RowId, TransactionRecord, WalletError,
};

use super::{Storage, StorageTransaction};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS account (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        currency TEXT NOT NULL,
        balance NUMERIC NOT NULL DEFAULT 0,
        CONSTRAINT account_unique UNIQUE (name, currency)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS business_transaction (
        id BIGSERIAL PRIMARY KEY,
        time TIMESTAMPTZ NOT NULL,
        author TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balance_action (
        id BIGSERIAL PRIMARY KEY,
        account BIGINT NOT NULL REFERENCES account (id),
        trans BIGINT NOT NULL REFERENCES business_transaction (id),
        volume NUMERIC NOT NULL
    )
    "#,
];

/// PostgreSQL-backed storage.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Create storage over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| WalletError::storage("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger relations if they do not exist.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| WalletError::storage("ensure_schema", e))?;
        }
        info!("Ledger schema is ready");
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStorage {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WalletError::storage("begin", e))?;
        Ok(PgTransaction { tx: Some(tx) })
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query("SELECT name, currency, balance FROM account ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WalletError::storage("list_accounts", e))?;

        rows.iter()
            .map(|row| {
                Ok(Account::new(
                    AccountId::new(
                        row.try_get::<String, _>("name")
                            .map_err(|e| WalletError::storage("list_accounts", e))?,
                        row.try_get::<String, _>("currency")
                            .map_err(|e| WalletError::storage("list_accounts", e))?,
                    ),
                    row.try_get("balance")
                        .map_err(|e| WalletError::storage("list_accounts", e))?,
                ))
            })
            .collect()
    }

    async fn list_transactions(&self) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                t.id,
                t.time,
                t.author,
                a.name,
                a.currency,
                ba.volume
            FROM business_transaction t
            LEFT JOIN balance_action ba ON ba.trans = t.id
            LEFT JOIN account a ON a.id = ba.account
            ORDER BY t.id ASC, ba.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WalletError::storage("list_transactions", e))?;

        let mut records: Vec<TransactionRecord> = Vec::new();
        for row in rows {
            let decode = |e| WalletError::storage("list_transactions", e);

            let id = RowId::new(row.try_get("id").map_err(decode)?);
            if records.last().map(|record| record.id) != Some(id) {
                records.push(TransactionRecord {
                    id,
                    timestamp: row.try_get("time").map_err(decode)?,
                    author: row.try_get("author").map_err(decode)?,
                    actions: Vec::new(),
                });
            }

            let name: Option<String> = row.try_get("name").map_err(decode)?;
            let currency: Option<String> = row.try_get("currency").map_err(decode)?;
            let volume: Option<Decimal> = row.try_get("volume").map_err(decode)?;
            if let (Some(name), Some(currency), Some(volume), Some(record)) =
                (name, currency, volume, records.last_mut())
            {
                record
                    .actions
                    .push(BalanceAction::new(AccountId::new(name, currency), volume));
            }
        }

        Ok(records)
    }
}

/// Open database transaction.
///
/// Dropping it without commit rolls the database transaction back.
pub struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn active(&mut self, operation: &'static str) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| WalletError::storage(operation, "transaction already finished"))
    }
}

#[async_trait]
impl StorageTransaction for PgTransaction {
    async fn query_account_for_update(&mut self, id: &AccountId) -> Result<(Account, RowId)> {
        let tx = self.active("query_account_for_update")?;

        let row = sqlx::query(
            "SELECT id, balance FROM account WHERE name = $1 AND currency = $2 FOR UPDATE",
        )
        .bind(&id.identifier)
        .bind(&id.currency)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| WalletError::lookup(id.clone(), e))?
        .ok_or_else(|| WalletError::AccountNotFound(id.clone()))?;

        let pk: i64 = row
            .try_get("id")
            .map_err(|e| WalletError::lookup(id.clone(), e))?;
        let balance: Decimal = row
            .try_get("balance")
            .map_err(|e| WalletError::lookup(id.clone(), e))?;

        Ok((Account::new(id.clone(), balance), RowId::new(pk)))
    }

    async fn upsert_account(&mut self, account: &Account) -> Result<()> {
        let tx = self.active("upsert_account")?;

        sqlx::query(
            r#"
            INSERT INTO account (name, currency, balance) VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT account_unique DO UPDATE SET balance = EXCLUDED.balance
            "#,
        )
        .bind(&account.id.identifier)
        .bind(&account.id.currency)
        .bind(account.balance)
        .execute(&mut **tx)
        .await
        .map_err(|e| WalletError::storage("upsert_account", e))?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account, row: RowId) -> Result<()> {
        let tx = self.active("update_account")?;

        sqlx::query("UPDATE account SET balance = $1 WHERE id = $2")
            .bind(account.balance)
            .bind(row.get())
            .execute(&mut **tx)
            .await
            .map_err(|e| WalletError::storage("update_account", e))?;
        Ok(())
    }

    async fn insert_transaction_header(
        &mut self,
        time: DateTime<Utc>,
        author: &str,
    ) -> Result<RowId> {
        let tx = self.active("insert_transaction_header")?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO business_transaction (time, author) VALUES ($1, $2) RETURNING id",
        )
        .bind(time)
        .bind(author)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| WalletError::storage("insert_transaction_header", e))?;
        Ok(RowId::new(id))
    }

    async fn insert_action(
        &mut self,
        account_row: RowId,
        transaction_row: RowId,
        volume: Decimal,
    ) -> Result<()> {
        let tx = self.active("insert_action")?;

        sqlx::query("INSERT INTO balance_action (account, trans, volume) VALUES ($1, $2, $3)")
            .bind(account_row.get())
            .bind(transaction_row.get())
            .bind(volume)
            .execute(&mut **tx)
            .await
            .map_err(|e| WalletError::storage("insert_action", e))?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| WalletError::storage("commit", "transaction already finished"))?;
        tx.commit()
            .await
            .map_err(|e| WalletError::storage("commit", e))
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(WalletError::rollback)?;
        }
        Ok(())
    }
}
