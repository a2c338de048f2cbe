//! Wallet Common Types
//!
//! This crate contains the types shared by the ledger engine and its callers:
//! account identifiers, the balance/transaction data model and the error
//! taxonomy.

pub mod error;
pub mod identifiers;
pub mod model;

pub use error::*;
pub use identifiers::*;
pub use model::*;
