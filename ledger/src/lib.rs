//! Wallet Ledger Engine
//!
//! Applies business transactions to account balances atomically. Account rows
//! are locked in a global order, a mutation policy validates the in-memory
//! result, and only then are balances and the transaction record persisted.

pub mod executor;
pub mod metrics;
pub mod repository;
pub mod storage;
pub mod transaction;

pub use executor::Executor;
pub use metrics::{LedgerMetrics, MetricsSnapshot};
pub use repository::Repository;
pub use storage::memory::MemoryStorage;
pub use storage::postgres::PgStorage;
pub use storage::{Storage, StorageTransaction};
pub use transaction::{lock_order, AccountAccess, LedgerPhase, LedgerTransaction};
