//! Ledger counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Ledger metrics.
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    /// Ledger transactions opened.
    pub transactions_total: AtomicU64,
    /// Ledger transactions committed.
    pub transactions_committed: AtomicU64,
    /// Ledger transactions rolled back.
    pub transactions_aborted: AtomicU64,
    /// Aborts caused by a policy violation.
    pub policy_rejections: AtomicU64,
    /// Account rows locked.
    pub rows_locked: AtomicU64,
    /// Accounts created or reset through the unconditional path.
    pub accounts_stored: AtomicU64,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_opened(&self) {
        self.transactions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transaction_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transaction_aborted(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn policy_rejected(&self) {
        self.policy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn row_locked(&self) {
        self.rows_locked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn account_stored(&self) {
        self.accounts_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_total: self.transactions_total.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            policy_rejections: self.policy_rejections.load(Ordering::Relaxed),
            rows_locked: self.rows_locked.load(Ordering::Relaxed),
            accounts_stored: self.accounts_stored.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LedgerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transactions_total: u64,
    pub transactions_committed: u64,
    pub transactions_aborted: u64,
    pub policy_rejections: u64,
    pub rows_locked: u64,
    pub accounts_stored: u64,
}

impl MetricsSnapshot {
    /// Ledger transactions neither committed nor aborted yet.
    pub fn in_flight(&self) -> u64 {
        self.transactions_total
            .saturating_sub(self.transactions_committed + self.transactions_aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = LedgerMetrics::new();

        metrics.transaction_opened();
        metrics.transaction_opened();
        metrics.transaction_opened();
        metrics.transaction_committed();
        metrics.transaction_aborted();
        metrics.policy_rejected();
        metrics.row_locked();
        metrics.row_locked();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transactions_total, 3);
        assert_eq!(snapshot.transactions_committed, 1);
        assert_eq!(snapshot.transactions_aborted, 1);
        assert_eq!(snapshot.policy_rejections, 1);
        assert_eq!(snapshot.rows_locked, 2);
        assert_eq!(snapshot.in_flight(), 1);
    }
}
