use ledger_reckoning::stores::Stores;
use ledger_reckoning::{DeriveOptions, Engine, Error, UserId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn engine() -> Arc<Engine> {
    Arc::new(Engine::new(Stores::in_memory(), DeriveOptions::default()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_deposits_and_withdrawals_conserve_balance() {
    let engine = engine();
    let user = UserId::generate();
    let account = engine.create_account(user, "busy").await.unwrap().id;
    let start = dec!(1000.00);
    let amount = dec!(2.50);
    engine.deposit(user, account, start).await.unwrap();

    let (deposits, withdrawals) = (60u32, 40u32);
    let mut handles = Vec::new();
    for i in 0..deposits + withdrawals {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            if i < deposits {
                engine.deposit(user, account, amount).await
            } else {
                engine.withdraw(user, account, amount).await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let expected = start + Decimal::from(deposits - withdrawals) * amount;
    assert_eq!(engine.balance(account).await.unwrap().balance, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_overdraw_never_goes_negative() {
    let engine = engine();
    let user = UserId::generate();
    let account = engine.create_account(user, "thin").await.unwrap().id;
    let amount = dec!(7);
    engine.deposit(user, account, amount * dec!(10)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.withdraw(user, account, amount).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert_eq!(err, Error::InsufficientBalance),
        }
    }
    assert_eq!(succeeded, 10);
    assert_eq!(engine.balance(account).await.unwrap().balance, Decimal::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn opposing_transfers_do_not_deadlock_and_conserve_money() {
    let engine = engine();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let a = engine.create_account(alice, "a").await.unwrap().id;
    let b = engine.create_account(bob, "b").await.unwrap().id;
    engine.deposit(alice, a, dec!(500)).await.unwrap();
    engine.deposit(bob, b, dec!(500)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..100 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                engine.transfer(alice, a, b, dec!(3)).await
            } else {
                engine.transfer(bob, b, a, dec!(3)).await
            }
        }));
    }
    let all = async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(10), all)
        .await
        .expect("transfers deadlocked");

    let total = engine.balance(a).await.unwrap().balance + engine.balance(b).await.unwrap().balance;
    assert_eq!(total, dec!(1000));
    assert_eq!(engine.balance(a).await.unwrap().balance, dec!(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refunds_of_one_transfer_succeed_once() {
    let engine = engine();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let a = engine.create_account(alice, "a").await.unwrap().id;
    let b = engine.create_account(bob, "b").await.unwrap().id;
    engine.deposit(alice, a, dec!(40)).await.unwrap();
    let transfer = engine.transfer(alice, a, b, dec!(40)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        let actor = if i % 2 == 0 { alice } else { bob };
        handles.push(tokio::spawn(async move { engine.refund(actor, transfer.id).await }));
    }

    let mut refunded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => refunded += 1,
            Err(err) => assert_eq!(err, Error::AlreadyRefunded),
        }
    }
    assert_eq!(refunded, 1);
    assert_eq!(engine.balance(a).await.unwrap().balance, dec!(40));
    assert_eq!(engine.balance(b).await.unwrap().balance, Decimal::ZERO);
}
