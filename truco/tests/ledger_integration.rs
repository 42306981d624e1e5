//! Integration tests for the wallet ledger.
//!
//! Tests concurrent balance changes, idempotency keys under contention and
//! the transaction log as the source of truth for balances.

use proptest::prelude::*;
use std::sync::Arc;
use truco::{
    db::MemoryStore,
    wallet::{Amount, TransactionKind, WalletConfig, WalletError, WalletManager},
};

fn setup() -> (WalletManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let wallet = WalletManager::new(store.clone(), WalletConfig::default()).unwrap();
    (wallet, store)
}

#[derive(Debug, Clone)]
enum LedgerOp {
    Credit(Amount),
    Debit(Amount),
    Settle { wager: Amount, won: bool },
}

fn op_strategy() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (1i64..500).prop_map(LedgerOp::Credit),
        (1i64..500).prop_map(LedgerOp::Debit),
        (1i64..200, any::<bool>()).prop_map(|(wager, won)| LedgerOp::Settle { wager, won }),
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_and_debits_never_overdraw() {
    let (wallet, _) = setup();
    let user = wallet.open_account("ana", 100).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..40 {
        let wallet = wallet.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                wallet.credit(user.id, 10, "top up", None).await.map(|tx| tx.amount)
            } else {
                wallet.debit(user.id, 25, "withdraw").await.map(|tx| tx.amount)
            }
        }));
    }

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(delta) => applied += delta,
            Err(WalletError::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected ledger error: {e}"),
        }
    }

    let balance = wallet.get_balance(user.id).await.unwrap();
    assert!(balance >= 0);
    assert_eq!(balance, 100 + applied);

    let history = wallet.transactions(user.id, 1000).await.unwrap();
    assert_eq!(history.iter().map(|tx| tx.amount).sum::<Amount>(), balance);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_with_one_key_apply_once() {
    let (wallet, store) = setup();
    let user = wallet.open_account("ana", 0).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let wallet = wallet.clone();
        tasks.push(tokio::spawn(async move {
            wallet
                .credit(user.id, 50, "deposit", Some("user_1_deposit_99"))
                .await
                .unwrap()
        }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().id);
    }
    ids.dedup();

    assert_eq!(ids.len(), 1, "every caller sees the same transaction");
    assert_eq!(wallet.get_balance(user.id).await.unwrap(), 50);
    assert_eq!(store.transaction_count(), 1);
}

#[tokio::test]
async fn test_users_do_not_block_each_other() {
    let (wallet, _) = setup();
    let ana = wallet.open_account("ana", 100).await.unwrap();
    let bia = wallet.open_account("bia", 100).await.unwrap();

    let (a, b) = tokio::join!(
        wallet.settle_bet(ana.id, 10, true, Some("settle_1_1_1")),
        wallet.settle_bet(bia.id, 10, false, Some("settle_1_1_2")),
    );
    assert_eq!(a.unwrap().balance_after, 118);
    assert_eq!(b.unwrap().balance_after, 90);
}

#[tokio::test]
async fn test_player_stats_follow_settlements() {
    let (wallet, _) = setup();
    let user = wallet.open_account("ana", 1_000).await.unwrap();
    wallet.settle_bet(user.id, 10, true, Some("settle_1_1_1")).await.unwrap();
    wallet.settle_bet(user.id, 20, false, Some("settle_1_2_1")).await.unwrap();
    wallet.settle_bet(user.id, 10, true, Some("settle_2_1_1")).await.unwrap();

    let stats = wallet.player_stats(user.id).await.unwrap();
    assert_eq!(stats.total_games, 3);
    assert_eq!(stats.wins, 2);
    assert_eq!(stats.losses, 1);
    assert_eq!(stats.net_profit, 18 + 18 - 20);

    let history = wallet.transactions(user.id, 10).await.unwrap();
    assert_eq!(history[0].kind, TransactionKind::BetWin);
    assert_eq!(history.last().unwrap().kind, TransactionKind::Deposit);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_balance_is_sum_of_applied_deltas(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (wallet, _) = setup();
            let user = wallet.open_account("ana", 0).await.unwrap();
            let mut expected: Amount = 0;

            for (i, op) in ops.into_iter().enumerate() {
                let key = format!("op_{i}");
                let result = match op {
                    LedgerOp::Credit(amount) => wallet.credit(user.id, amount, "credit", Some(&key)).await,
                    LedgerOp::Debit(amount) => wallet.debit(user.id, amount, "debit").await,
                    LedgerOp::Settle { wager, won } => {
                        wallet.settle_bet(user.id, wager, won, Some(&key)).await
                    }
                };
                match result {
                    Ok(tx) => {
                        expected += tx.amount;
                        prop_assert_eq!(tx.balance_after, expected);
                    }
                    Err(WalletError::InsufficientFunds { available, .. }) => {
                        prop_assert_eq!(available, expected);
                    }
                    Err(e) => prop_assert!(false, "unexpected error: {}", e),
                }
                prop_assert!(expected >= 0);
            }

            prop_assert_eq!(wallet.get_balance(user.id).await.unwrap(), expected);
            Ok(())
        })?;
    }
}
