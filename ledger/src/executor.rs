//! Mutation policies.
//!
//! An [`Executor`] decides whether the balance changes of a business
//! transaction are legal. It runs inside the ledger transaction, after every
//! referenced account is locked and before anything is written.

use std::fmt;

use rust_decimal::Decimal;
use tracing::{info, instrument};

use wallet_common::{Account, BusinessTransaction, Result, WalletError};

use crate::repository::Repository;
use crate::storage::Storage;
use crate::transaction::AccountAccess;

/// Transaction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    /// Administrative adjustments, applied without restriction.
    Manager,
    /// Client transfers: single currency, debits must be covered.
    Client,
}

impl Executor {
    /// Author tag recorded with every transaction executed by this policy.
    pub fn author_tag(&self) -> &'static str {
        match self {
            Executor::Manager => "manager",
            Executor::Client => "client",
        }
    }

    /// Execute `trans` through `repo`.
    ///
    /// Returns the state of the affected account after each action, in
    /// application order. An account touched twice appears twice.
    #[instrument(skip(self, trans, repo), fields(policy = %self, actions = trans.len()))]
    pub async fn execute<S: Storage>(
        &self,
        trans: &BusinessTransaction,
        repo: &Repository<S>,
    ) -> Result<Vec<Account>> {
        if trans.is_empty() {
            return Err(WalletError::MalformedTransaction(
                "transaction has no actions".to_string(),
            ));
        }

        let policy = *self;
        let mut affected = Vec::with_capacity(trans.len());
        repo.modify(trans, self.author_tag(), |accounts| match policy {
            Executor::Manager => apply_unrestricted(trans, accounts, &mut affected),
            Executor::Client => apply_client(trans, accounts, &mut affected),
        })
        .await?;

        info!(affected = affected.len(), "Transaction executed");
        Ok(affected)
    }
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.author_tag())
    }
}

fn apply_unrestricted(
    trans: &BusinessTransaction,
    accounts: &mut dyn AccountAccess,
    affected: &mut Vec<Account>,
) -> Result<()> {
    for action in trans.actions() {
        let account = accounts.account_mut(&action.account)?;
        apply_volume(account, action.volume)?;
        affected.push(account.clone());
    }
    Ok(())
}

fn apply_client(
    trans: &BusinessTransaction,
    accounts: &mut dyn AccountAccess,
    affected: &mut Vec<Account>,
) -> Result<()> {
    let Some(first) = trans.actions().first() else {
        return Ok(());
    };
    let currency = &first.account.currency;

    for action in trans.actions() {
        if action.account.currency != *currency {
            return Err(WalletError::CurrencyMismatch {
                account: action.account.clone(),
                expected: currency.clone(),
            });
        }

        let account = accounts.account_mut(&action.account)?;
        let before = account.balance;
        apply_volume(account, action.volume)?;

        // Only a debit that takes a covered balance below zero is refused.
        if action.volume < Decimal::ZERO
            && before >= Decimal::ZERO
            && account.balance < Decimal::ZERO
        {
            return Err(WalletError::InsufficientFunds(action.account.clone()));
        }
        affected.push(account.clone());
    }
    Ok(())
}

fn apply_volume(account: &mut Account, volume: Decimal) -> Result<()> {
    account.balance = account
        .balance
        .checked_add(volume)
        .ok_or_else(|| WalletError::BalanceOverflow(account.id.clone()))?;
    Ok(())
}
