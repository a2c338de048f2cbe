//! Error types for wallet ledger operations.

use crate::AccountId;
use thiserror::Error;

/// Boxed driver error kept as the `source` of storage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for wallet operations.
#[derive(Error, Debug)]
pub enum WalletError {
    /// A policy asked for an account outside the locked set.
    #[error("Account {0} was not prefetched")]
    NotPrefetched(AccountId),

    /// Account row does not exist.
    #[error("Account {0} does not exist")]
    AccountNotFound(AccountId),

    /// Account row could not be read or locked.
    #[error("Failed to load account {account}: {source}")]
    Lookup {
        account: AccountId,
        #[source]
        source: BoxError,
    },

    /// Transaction mixes currencies.
    #[error("Account {account} is not in the transaction currency {expected}")]
    CurrencyMismatch { account: AccountId, expected: String },

    /// Debit is not covered by the account balance.
    #[error("Account {0} does not have enough funds")]
    InsufficientFunds(AccountId),

    /// Applying an action would take the balance outside the decimal range.
    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),

    /// Transaction shape is not accepted by the policy.
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    /// Storage write, commit or query failed.
    #[error("Storage error in {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// Rollback failed; the connection state can no longer be trusted.
    #[error("Failed to roll back storage transaction: {source}")]
    RollbackFailed {
        #[source]
        source: BoxError,
    },

    /// Request rejected before reaching the ledger.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Service refuses requests after a fatal failure.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification of [`WalletError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotPrefetched,
    LookupFailure,
    PolicyViolation,
    PersistenceFailure,
    RollbackFailure,
    InvalidRequest,
    Unavailable,
}

impl WalletError {
    /// Wrap a driver error raised by a storage operation.
    pub fn storage(operation: &'static str, source: impl Into<BoxError>) -> Self {
        WalletError::Storage {
            operation,
            source: source.into(),
        }
    }

    /// Wrap a driver error raised while loading an account.
    pub fn lookup(account: AccountId, source: impl Into<BoxError>) -> Self {
        WalletError::Lookup {
            account,
            source: source.into(),
        }
    }

    /// Wrap a driver error raised by a rollback.
    pub fn rollback(source: impl Into<BoxError>) -> Self {
        WalletError::RollbackFailed {
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::NotPrefetched(_) => ErrorKind::NotPrefetched,
            WalletError::AccountNotFound(_) | WalletError::Lookup { .. } => {
                ErrorKind::LookupFailure
            }
            WalletError::CurrencyMismatch { .. }
            | WalletError::InsufficientFunds(_)
            | WalletError::BalanceOverflow(_)
            | WalletError::MalformedTransaction(_) => ErrorKind::PolicyViolation,
            WalletError::Storage { .. } => ErrorKind::PersistenceFailure,
            WalletError::RollbackFailed { .. } => ErrorKind::RollbackFailure,
            WalletError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            WalletError::ServiceUnavailable(_) | WalletError::Configuration(_) => {
                ErrorKind::Unavailable
            }
        }
    }

    /// Fatal errors leave the storage session in an unknown state; the owner
    /// of the session must stop using it.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::RollbackFailure
    }

    /// Get error code for responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::NotPrefetched(_) => "NOT_PREFETCHED",
            WalletError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WalletError::Lookup { .. } => "LOOKUP_FAILED",
            WalletError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            WalletError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            WalletError::BalanceOverflow(_) => "BALANCE_OVERFLOW",
            WalletError::MalformedTransaction(_) => "MALFORMED_TRANSACTION",
            WalletError::Storage { .. } => "STORAGE_ERROR",
            WalletError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            WalletError::InvalidRequest(_) => "INVALID_REQUEST",
            WalletError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            WalletError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;
