//! Identifier types for wallet entities.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Natural key of an account: an account address within one currency.
///
/// The same identifier may exist in several currencies; each pair is a
/// separate account with its own balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId {
    /// Account address (or any unique key chosen by the caller).
    pub identifier: String,
    /// Currency code of the account.
    pub currency: String,
}

impl AccountId {
    /// Create a new account ID.
    pub fn new(identifier: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            currency: currency.into(),
        }
    }
}

/// Accounts order by `(currency, identifier)`.
///
/// Every ledger transaction locks account rows in this order, so two
/// transactions touching overlapping account sets can never wait on each
/// other in a cycle.
impl Ord for AccountId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.currency
            .cmp(&other.currency)
            .then_with(|| self.identifier.cmp(&other.identifier))
    }
}

impl PartialOrd for AccountId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" ({})", self.identifier, self.currency)
    }
}

/// Storage row handle.
///
/// Issued by the storage backend when a row is locked or inserted and only
/// meaningful inside the backend that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(i64);

impl RowId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_equality() {
        assert_eq!(AccountId::new("123", "USD"), AccountId::new("123", "USD"));
        assert_ne!(AccountId::new("123", "USD"), AccountId::new("123", "EUR"));
        assert_ne!(AccountId::new("123", "USD"), AccountId::new("124", "USD"));
    }

    #[test]
    fn test_account_id_orders_by_currency_first() {
        let mut ids = vec![
            AccountId::new("a", "USD"),
            AccountId::new("z", "EUR"),
            AccountId::new("b", "EUR"),
            AccountId::new("0", "USD"),
        ];
        ids.sort();

        assert_eq!(
            ids,
            vec![
                AccountId::new("b", "EUR"),
                AccountId::new("z", "EUR"),
                AccountId::new("0", "USD"),
                AccountId::new("a", "USD"),
            ]
        );
    }

    #[test]
    fn test_account_id_display() {
        let id = AccountId::new("qwerty1", "USD");
        assert_eq!(id.to_string(), "\"qwerty1\" (USD)");
    }
}
