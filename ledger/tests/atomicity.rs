//! Property tests for the ledger transaction protocol.

mod support;

use std::collections::HashMap;

use proptest::prelude::*;
use rust_decimal::Decimal;

use support::{seeded, FailPoint, FailingStorage};
use wallet_common::{Account, AccountId, BalanceAction, BusinessTransaction, ErrorKind, WalletError};
use wallet_ledger::{lock_order, Executor, Repository};

const ACCOUNTS: [(&str, &str); 5] = [
    ("alice", "USD"),
    ("bob", "USD"),
    ("carol", "USD"),
    ("alice", "EUR"),
    ("dave", "EUR"),
];

fn account_id() -> impl Strategy<Value = AccountId> {
    prop::sample::select(ACCOUNTS.to_vec())
        .prop_map(|(identifier, currency)| AccountId::new(identifier, currency))
}

fn balance_action() -> impl Strategy<Value = BalanceAction> {
    (account_id(), -500i64..500)
        .prop_map(|(id, volume)| BalanceAction::new(id, Decimal::from(volume)))
}

fn business_transaction() -> impl Strategy<Value = BusinessTransaction> {
    prop::collection::vec(balance_action(), 1..8).prop_map(BusinessTransaction::new)
}

fn initial_accounts() -> impl Strategy<Value = Vec<Account>> {
    prop::collection::vec(-1000i64..1000, ACCOUNTS.len()).prop_map(|balances| {
        ACCOUNTS
            .iter()
            .zip(balances)
            .map(|((identifier, currency), balance)| {
                Account::new(AccountId::new(*identifier, *currency), Decimal::from(balance))
            })
            .collect()
    })
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Storage(FailPoint),
    Policy,
}

fn failure() -> impl Strategy<Value = Option<Failure>> {
    prop_oneof![
        Just(None),
        (0usize..6).prop_map(|n| Some(Failure::Storage(FailPoint::Load(n)))),
        Just(Some(Failure::Policy)),
        Just(Some(Failure::Storage(FailPoint::Header))),
        (0usize..8).prop_map(|n| Some(Failure::Storage(FailPoint::Action(n)))),
        (0usize..6).prop_map(|n| Some(Failure::Storage(FailPoint::Balance(n)))),
        Just(Some(Failure::Storage(FailPoint::Commit))),
    ]
}

fn balances(accounts: &[Account]) -> HashMap<AccountId, Decimal> {
    accounts
        .iter()
        .map(|account| (account.id.clone(), account.balance))
        .collect()
}

proptest! {
    #[test]
    fn transaction_is_all_or_nothing(
        initial in initial_accounts(),
        trans in business_transaction(),
        failure in failure(),
    ) {
        tokio_test::block_on(async {
            let fail_at = match failure {
                Some(Failure::Storage(point)) => Some(point),
                _ => None,
            };
            let storage = FailingStorage::new(seeded(&initial).await, fail_at);
            let repo = Repository::new(storage.clone());
            let fail_policy = matches!(failure, Some(Failure::Policy));

            let result = repo
                .modify(&trans, "test", |accounts| {
                    for action in trans.actions() {
                        accounts.account_mut(&action.account)?.balance += action.volume;
                    }
                    if fail_policy {
                        return Err(WalletError::MalformedTransaction("rejected".to_string()));
                    }
                    Ok(())
                })
                .await;

            let after = balances(&repo.accounts().await.unwrap());
            let history = repo.transaction_history().await.unwrap();

            if storage.fired() || fail_policy {
                prop_assert!(result.is_err());
                prop_assert_eq!(after, balances(&initial));
                prop_assert!(history.is_empty());
            } else {
                prop_assert!(result.is_ok());
                let mut expected = balances(&initial);
                for action in trans.actions() {
                    *expected.get_mut(&action.account).unwrap() += action.volume;
                }
                prop_assert_eq!(after, expected);
                prop_assert_eq!(history.len(), 1);
                prop_assert_eq!(&history[0].actions[..], trans.actions());
                prop_assert_eq!(history[0].author.as_str(), "test");
            }
            Ok(())
        })?;
    }

    #[test]
    fn lock_order_is_independent_of_action_order(
        actions in prop::collection::vec(balance_action(), 1..10).prop_shuffle(),
        seed in any::<u64>(),
    ) {
        let forward = BusinessTransaction::new(actions.clone());
        let mut rotated = actions;
        let len = rotated.len();
        rotated.rotate_left((seed as usize) % len);
        rotated.reverse();
        let backward = BusinessTransaction::new(rotated);

        let order = lock_order(&forward);
        prop_assert_eq!(&order, &lock_order(&backward));
        prop_assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
        for id in forward.accounts() {
            prop_assert!(order.contains(id));
        }
    }

    #[test]
    fn rows_are_locked_in_lock_order(
        initial in initial_accounts(),
        trans in business_transaction(),
    ) {
        tokio_test::block_on(async {
            let storage = FailingStorage::new(seeded(&initial).await, None);
            let repo = Repository::new(storage.clone());

            let result = Executor::Manager.execute(&trans, &repo).await;

            prop_assert_eq!(storage.locked(), lock_order(&trans));
            if result.is_ok() {
                let mut written = storage.written();
                written.sort();
                prop_assert_eq!(written, lock_order(&trans));
            }
            Ok(())
        })?;
    }

    #[test]
    fn unlocked_account_is_never_reachable(
        initial in initial_accounts(),
        trans in business_transaction(),
        outsider in account_id(),
    ) {
        prop_assume!(!trans.accounts().any(|id| *id == outsider));

        tokio_test::block_on(async {
            let repo = Repository::new(seeded(&initial).await);

            let err = repo
                .modify(&trans, "test", |accounts| {
                    accounts.account(&outsider)?;
                    Ok(())
                })
                .await
                .unwrap_err();

            prop_assert_eq!(err.kind(), ErrorKind::NotPrefetched);
            prop_assert_eq!(balances(&repo.accounts().await.unwrap()), balances(&initial));
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn repeated_account_gets_one_balance_write() {
    let alice = Account::new(AccountId::new("alice", "USD"), Decimal::from(10));
    let bob = Account::new(AccountId::new("bob", "USD"), Decimal::from(10));
    let storage = FailingStorage::new(seeded(&[alice.clone(), bob.clone()]).await, None);
    let repo = Repository::new(storage.clone());
    let trans = BusinessTransaction::new(vec![
        BalanceAction::new(alice.id.clone(), Decimal::from(5)),
        BalanceAction::new(bob.id.clone(), Decimal::from(-4)),
        BalanceAction::new(alice.id.clone(), Decimal::from(-3)),
    ]);

    Executor::Manager.execute(&trans, &repo).await.unwrap();

    let mut written = storage.written();
    written.sort();
    assert_eq!(written, vec![alice.id.clone(), bob.id.clone()]);
    let after = balances(&repo.accounts().await.unwrap());
    assert_eq!(after[&alice.id], Decimal::from(12));
    assert_eq!(after[&bob.id], Decimal::from(6));
    assert_eq!(repo.transaction_history().await.unwrap()[0].actions.len(), 3);
}

#[tokio::test]
async fn failed_rollback_is_reported_as_fatal() {
    let alice = Account::new(AccountId::new("alice", "USD"), Decimal::from(10));
    let storage = FailingStorage::new(seeded(&[alice.clone()]).await, Some(FailPoint::Commit))
        .with_failing_rollback();
    let repo = Repository::new(storage);
    let trans = BusinessTransaction::new(vec![BalanceAction::new(alice.id.clone(), Decimal::ONE)]);

    let err = Executor::Manager.execute(&trans, &repo).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, WalletError::RollbackFailed { .. }));
    assert_eq!(repo.accounts().await.unwrap(), vec![alice]);
}

#[tokio::test]
async fn commit_failure_surfaces_storage_error() {
    let alice = Account::new(AccountId::new("alice", "USD"), Decimal::from(10));
    let storage = FailingStorage::new(seeded(&[alice.clone()]).await, Some(FailPoint::Commit));
    let repo = Repository::new(storage);
    let trans = BusinessTransaction::new(vec![BalanceAction::new(alice.id.clone(), -Decimal::ONE)]);

    let err = Executor::Client.execute(&trans, &repo).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    assert_eq!(repo.accounts().await.unwrap(), vec![alice]);
    assert!(repo.transaction_history().await.unwrap().is_empty());
}
