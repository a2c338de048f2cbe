//! Wallet service
//!
//! Request facade over the wallet ledger: account creation, manager balance
//! adjustments and client payments, with a poisoned state that refuses
//! further work after a fatal storage failure.

pub mod config;
pub mod metrics;
pub mod service;
pub mod state;

pub use config::{DatabaseConfig, LogFormat, ServiceConfig};
pub use metrics::{Metrics, ServiceSnapshot, SharedMetrics};
pub use service::WalletService;
pub use state::ServiceState;
