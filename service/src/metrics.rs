//! Metrics collection for service monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use wallet_ledger::MetricsSnapshot as LedgerSnapshot;

/// Service metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Requests received.
    pub requests_total: AtomicU64,
    /// Requests that completed successfully.
    pub requests_success: AtomicU64,
    /// Requests rejected by validation or policy.
    pub requests_rejected: AtomicU64,
    /// Requests that failed in storage.
    pub requests_failed: AtomicU64,
    /// Requests refused because the service is poisoned.
    pub requests_refused: AtomicU64,
    /// Payments committed.
    pub payments_committed: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment requests received.
    pub fn request_received(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request success.
    pub fn request_success(&self) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request rejection.
    pub fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request failure.
    pub fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request refused while poisoned.
    pub fn request_refused(&self) {
        self.requests_refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed payment.
    pub fn payment_committed(&self) {
        self.payments_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_refused: self.requests_refused.load(Ordering::Relaxed),
            payments_committed: self.payments_committed.load(Ordering::Relaxed),
        }
    }

    /// Export service and ledger counters in Prometheus format.
    pub fn to_prometheus(&self, ledger: &LedgerSnapshot) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("wallet_requests_total", "Total number of requests", snapshot.requests_total),
            (
                "wallet_requests_success",
                "Requests completed successfully",
                snapshot.requests_success,
            ),
            (
                "wallet_requests_rejected",
                "Requests rejected by validation or policy",
                snapshot.requests_rejected,
            ),
            ("wallet_requests_failed", "Requests failed in storage", snapshot.requests_failed),
            (
                "wallet_requests_refused",
                "Requests refused while poisoned",
                snapshot.requests_refused,
            ),
            ("wallet_payments_committed", "Payments committed", snapshot.payments_committed),
            (
                "wallet_ledger_transactions_total",
                "Ledger transactions opened",
                ledger.transactions_total,
            ),
            (
                "wallet_ledger_transactions_committed",
                "Ledger transactions committed",
                ledger.transactions_committed,
            ),
            (
                "wallet_ledger_transactions_aborted",
                "Ledger transactions rolled back",
                ledger.transactions_aborted,
            ),
            (
                "wallet_ledger_policy_rejections",
                "Ledger aborts caused by a policy",
                ledger.policy_rejections,
            ),
            ("wallet_ledger_rows_locked", "Account rows locked", ledger.rows_locked),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }
        output.push_str(&format!(
            "# HELP wallet_ledger_transactions_active Ledger transactions in flight\n\
             # TYPE wallet_ledger_transactions_active gauge\n\
             wallet_ledger_transactions_active {}\n",
            ledger.in_flight()
        ));
        output
    }
}

/// Snapshot of service metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_rejected: u64,
    pub requests_failed: u64,
    pub requests_refused: u64,
    pub payments_committed: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
