//! Concurrent transactions over overlapping account sets.

mod support;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use support::seeded;
use wallet_common::{Account, AccountId, BalanceAction, BusinessTransaction, ErrorKind};
use wallet_ledger::{Executor, MemoryStorage, Repository};

const NAMES: [&str; 4] = ["a", "b", "c", "d"];
const WORKERS: usize = 8;
const ROUNDS: usize = 50;

fn id(name: &str) -> AccountId {
    AccountId::new(name, "USD")
}

/// Transaction for one round of one worker. Pairs are walked in both
/// directions so opposing workers contend for the same rows.
fn round(worker: usize, n: usize) -> BusinessTransaction {
    let from = NAMES[(worker + n) % NAMES.len()];
    let to = NAMES[(worker + n + 1 + worker % 3) % NAMES.len()];
    let amount = Decimal::from((worker * 7 + n * 3) % 40 + 1);

    if n % 5 == 4 {
        let third = NAMES[(worker + n + 2) % NAMES.len()];
        return BusinessTransaction::new(vec![
            BalanceAction::new(id(third), dec!(1)),
            BalanceAction::new(id(from), -amount),
            BalanceAction::new(id(to), amount - dec!(1)),
        ]);
    }
    if worker % 2 == 0 {
        BusinessTransaction::new(vec![
            BalanceAction::new(id(from), -amount),
            BalanceAction::new(id(to), amount),
        ])
    } else {
        BusinessTransaction::new(vec![
            BalanceAction::new(id(to), amount),
            BalanceAction::new(id(from), -amount),
        ])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transfers_conserve_money() {
    let initial: Vec<Account> = NAMES
        .iter()
        .map(|name| Account::new(id(name), dec!(100)))
        .collect();
    let repo: Arc<Repository<MemoryStorage>> = Arc::new(Repository::new(seeded(&initial).await));

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let mut committed = 0u64;
            for n in 0..ROUNDS {
                match Executor::Client.execute(&round(worker, n), &repo).await {
                    Ok(_) => committed += 1,
                    Err(err) => assert_eq!(err.kind(), ErrorKind::PolicyViolation, "{err}"),
                }
            }
            committed
        }));
    }

    let committed = tokio::time::timeout(Duration::from_secs(30), async {
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        total
    })
    .await
    .expect("transfers deadlocked");

    let accounts = repo.accounts().await.unwrap();
    let total: Decimal = accounts.iter().map(|account| account.balance).sum();
    assert_eq!(total, dec!(400));
    assert!(accounts.iter().all(|account| account.balance >= Decimal::ZERO));

    let history = repo.transaction_history().await.unwrap();
    assert_eq!(history.len() as u64, committed);
    for record in &history {
        let net: Decimal = record.actions.iter().map(|action| action.volume).sum();
        assert_eq!(net, Decimal::ZERO);
    }

    let snapshot = repo.metrics().snapshot();
    assert_eq!(snapshot.transactions_total, (WORKERS * ROUNDS) as u64);
    assert_eq!(snapshot.transactions_committed, committed);
    assert_eq!(snapshot.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn manager_adjustments_do_not_lose_updates() {
    let target = Account::new(id("pool"), dec!(0));
    let repo = Arc::new(Repository::new(seeded(&[target.clone()]).await));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let repo = repo.clone();
            let target = target.id.clone();
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    let trans = BusinessTransaction::new(vec![BalanceAction::new(
                        target.clone(),
                        dec!(1),
                    )]);
                    Executor::Manager.execute(&trans, &repo).await.unwrap();
                }
            })
        })
        .collect();

    tokio::time::timeout(Duration::from_secs(30), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await
    .expect("adjustments deadlocked");

    let accounts = repo.accounts().await.unwrap();
    assert_eq!(accounts[0].balance, Decimal::from(WORKERS * ROUNDS));
}
