//! Wallet service facade.

use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use wallet_common::{
    Account, AccountId, BalanceAction, BusinessTransaction, ErrorKind, Result, TransactionRecord,
    WalletError,
};
use wallet_ledger::{Executor, Repository, Storage};

use crate::metrics::{Metrics, SharedMetrics};
use crate::state::ServiceState;

/// Request surface of the wallet: accounts, manager adjustments and client
/// payments over one repository.
pub struct WalletService<S> {
    repo: Repository<S>,
    state: RwLock<ServiceState>,
    metrics: SharedMetrics,
}

impl<S: Storage> WalletService<S> {
    pub fn new(storage: S) -> Self {
        Self::with_repository(Repository::new(storage))
    }

    pub fn with_repository(repo: Repository<S>) -> Self {
        Self {
            repo,
            state: RwLock::new(ServiceState::Running),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repo
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Check if the service is accepting new requests.
    pub fn is_accepting_requests(&self) -> bool {
        self.state().accepts_requests()
    }

    /// Create an account with zero balance. An existing account with the
    /// same ID is reset to zero.
    #[instrument(skip(self, id), fields(account = %id))]
    pub async fn create_account(&self, id: AccountId) -> Result<()> {
        self.admit()?;
        let result = self.repo.add_account(Account::empty(id)).await;
        self.observe(result)
    }

    /// Apply one unrestricted balance change and return the adjusted account.
    #[instrument(skip(self, action), fields(account = %action.account, volume = %action.volume))]
    pub async fn adjust_balance(&self, action: BalanceAction) -> Result<Account> {
        self.admit()?;
        let trans = BusinessTransaction::new(vec![action]);
        let result = Executor::Manager
            .execute(&trans, &self.repo)
            .await
            .and_then(|mut affected| {
                affected.pop().ok_or_else(|| {
                    WalletError::MalformedTransaction("adjustment affected no account".to_string())
                })
            });
        self.observe(result)
    }

    /// Move `amount` from one account to another in `currency`.
    ///
    /// Returns the source and the destination account after the transfer.
    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn transfer(
        &self,
        from: &str,
        to: &str,
        currency: &str,
        amount: Decimal,
    ) -> Result<Vec<Account>> {
        self.admit()?;

        let result = match payment(from, to, currency, amount) {
            Ok(trans) => Executor::Client.execute(&trans, &self.repo).await,
            Err(err) => Err(err),
        };
        let accounts = self.observe(result)?;

        self.metrics.payment_committed();
        info!("Payment committed");
        Ok(accounts)
    }

    /// Committed state of all accounts.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.admit()?;
        let result = self.repo.accounts().await;
        self.observe(result)
    }

    /// All committed business transactions, oldest first.
    pub async fn payments(&self) -> Result<Vec<TransactionRecord>> {
        self.admit()?;
        let result = self.repo.transaction_history().await;
        self.observe(result)
    }

    fn admit(&self) -> Result<()> {
        self.metrics.request_received();
        let state = self.state();
        if !state.accepts_requests() {
            self.metrics.request_refused();
            return Err(WalletError::ServiceUnavailable(format!("service is {state}")));
        }
        Ok(())
    }

    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.metrics.request_success(),
            Err(err) if err.is_fatal() => {
                self.metrics.request_failed();
                *self.state.write() = ServiceState::Poisoned;
                error!(
                    error = %err,
                    code = err.error_code(),
                    "Fatal storage failure, refusing further requests"
                );
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::PolicyViolation
                    | ErrorKind::InvalidRequest
                    | ErrorKind::NotPrefetched => self.metrics.request_rejected(),
                    _ if matches!(err, WalletError::AccountNotFound(_)) => {
                        self.metrics.request_rejected()
                    }
                    _ => self.metrics.request_failed(),
                }
                warn!(error = %err, code = err.error_code(), "Request failed");
            }
        }
        result
    }
}

/// Two-party payment: debit `from`, credit `to`.
fn payment(from: &str, to: &str, currency: &str, amount: Decimal) -> Result<BusinessTransaction> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidRequest(format!(
            "payment amount must be positive, got {amount}"
        )));
    }
    if from == to {
        return Err(WalletError::InvalidRequest(
            "payment source and destination are the same account".to_string(),
        ));
    }

    Ok(BusinessTransaction::new(vec![
        BalanceAction::new(AccountId::new(from, currency), -amount),
        BalanceAction::new(AccountId::new(to, currency), amount),
    ]))
}
