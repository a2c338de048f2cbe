//! Ledger data model: accounts, balance actions and business transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identifiers::{AccountId, RowId};

/// Account state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account natural key.
    pub id: AccountId,
    /// Current balance.
    pub balance: Decimal,
}

impl Account {
    /// Create an account with the given balance.
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        Self { id, balance }
    }

    /// Create an account with zero balance.
    pub fn empty(id: AccountId) -> Self {
        Self::new(id, Decimal::ZERO)
    }
}

/// One delta applied to one account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAction {
    /// Account to modify.
    pub account: AccountId,
    /// Signed amount added to the balance.
    pub volume: Decimal,
}

impl BalanceAction {
    pub fn new(account: AccountId, volume: Decimal) -> Self {
        Self { account, volume }
    }
}

/// Business transaction: an ordered set of balance actions that is applied
/// atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessTransaction {
    actions: Vec<BalanceAction>,
}

impl BusinessTransaction {
    /// Create a transaction from actions in application order.
    pub fn new(actions: Vec<BalanceAction>) -> Self {
        Self { actions }
    }

    /// Actions in application order.
    pub fn actions(&self) -> &[BalanceAction] {
        &self.actions
    }

    /// Referenced accounts, in action order, repeats included.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.actions.iter().map(|action| &action.account)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Committed business transaction as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Header row handle.
    pub id: RowId,
    /// Capture time of the transaction.
    pub timestamp: DateTime<Utc>,
    /// Tag of the policy that authored the transaction.
    pub author: String,
    /// Applied actions in insertion order.
    pub actions: Vec<BalanceAction>,
}
