//! Integration tests for the store: repositories and the transfer
//! transaction, including its behavior under concurrency.

use minibank::store::{account, entry, transfer, Store, StoreError, TransferTxParams, UpdateUserParams};

mod common;

async fn entry_count(store: &Store, account_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

async fn transfer_count(store: &Store, account_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM transfers WHERE from_account_id = $1 OR to_account_id = $1",
    )
    .bind(account_id)
    .fetch_one(store.pool())
    .await
    .unwrap()
}

// =========================================================================
// Repository operations
// =========================================================================

#[tokio::test]
async fn test_create_and_get_account() {
    let store = Store::new(common::setup_test_db().await);
    let user = common::create_test_user(&store).await;
    let balance = common::random_balance();

    let created = common::create_test_account(&store, &user.username, balance).await;
    assert_eq!(created.owner, user.username);
    assert_eq!(created.balance, balance);
    assert_eq!(created.currency, "USD");

    let fetched = store.get_account(created.id).await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_get_account_not_found() {
    let store = Store::new(common::setup_test_db().await);

    let result = store.get_account(i64::MAX).await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_duplicate_currency_account_conflict() {
    let store = Store::new(common::setup_test_db().await);
    let user = common::create_test_user(&store).await;

    common::create_test_account(&store, &user.username, 0).await;
    let result = store
        .create_account(&minibank::store::CreateAccountParams {
            owner: user.username.clone(),
            balance: 0,
            currency: "USD".to_string(),
        })
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn test_add_account_balance() {
    let store = Store::new(common::setup_test_db().await);
    let account = common::create_funded_account(&store, 100).await;

    let updated = account::add_account_balance(store.pool(), account.id, 40)
        .await
        .unwrap();
    assert_eq!(updated.balance, 140);

    let updated = account::add_account_balance(store.pool(), account.id, -90)
        .await
        .unwrap();
    assert_eq!(updated.balance, 50);
}

#[tokio::test]
async fn test_get_account_for_update_inside_tx() {
    let store = Store::new(common::setup_test_db().await);
    let account = common::create_funded_account(&store, 250).await;

    let id = account.id;
    let locked = store
        .run_in_tx(move |tx| {
            Box::pin(async move { account::get_account_for_update(&mut **tx, id).await })
        })
        .await
        .unwrap();

    assert_eq!(locked.id, account.id);
    assert_eq!(locked.balance, 250);
}

#[tokio::test]
async fn test_list_entries_newest_first() {
    let store = Store::new(common::setup_test_db().await);
    let from = common::create_funded_account(&store, 1000).await;
    let to = common::create_funded_account(&store, 0).await;

    for amount in [10, 20, 30] {
        store
            .transfer_tx(TransferTxParams {
                from_account_id: from.id,
                to_account_id: to.id,
                amount,
            })
            .await
            .unwrap();
    }

    let entries = store.list_entries(from.id, 10, 0).await.unwrap();
    assert_eq!(entries.len(), 3);
    let amounts: Vec<i64> = entries.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![-30, -20, -10]);
    assert!(entries.iter().all(|e| e.account_id == from.id));

    let transfers = store.list_transfers(from.id, 10, 0).await.unwrap();
    assert_eq!(transfers.len(), 3);
}

#[tokio::test]
async fn test_delete_account_with_ledger_rows_conflicts() {
    let store = Store::new(common::setup_test_db().await);
    let from = common::create_funded_account(&store, 100).await;
    let to = common::create_funded_account(&store, 0).await;

    store
        .transfer_tx(TransferTxParams {
            from_account_id: from.id,
            to_account_id: to.id,
            amount: 10,
        })
        .await
        .unwrap();

    // Ledger rows reference the account; physical deletion must fail.
    let result = store.delete_account(from.id).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));

    // An account with no ledger history can be deleted.
    let empty = common::create_funded_account(&store, 0).await;
    store.delete_account(empty.id).await.unwrap();
    assert!(matches!(
        store.get_account(empty.id).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_update_user_partial_fields() {
    let store = Store::new(common::setup_test_db().await);
    let user = common::create_test_user(&store).await;

    // Updating only the name leaves the rest alone.
    let updated = store
        .update_user(
            &user.username,
            &UpdateUserParams {
                full_name: Some("Renamed User".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.full_name, "Renamed User");
    assert_eq!(updated.email, user.email);
    assert_eq!(updated.hashed_password, user.hashed_password);
    assert_eq!(updated.password_changed_at, user.password_changed_at);

    // A password change bumps password_changed_at.
    let new_hash = minibank::password::hash_password("newsecret123").unwrap();
    let updated = store
        .update_user(
            &user.username,
            &UpdateUserParams {
                hashed_password: Some(new_hash.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.hashed_password, new_hash);
    assert!(updated.password_changed_at > user.password_changed_at);
    assert_eq!(updated.full_name, "Renamed User");

    let result = store
        .update_user("nosuchuser", &UpdateUserParams::default())
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

// =========================================================================
// Transfer transaction
// =========================================================================

#[tokio::test]
async fn test_run_in_tx_discards_writes_on_error() {
    let store = Store::new(common::setup_test_db().await);
    let from = common::create_funded_account(&store, 100).await;
    let to = common::create_funded_account(&store, 100).await;

    // Write a transfer record and both entries, then fail. Every row
    // written before the error must be gone afterwards.
    let (from_id, to_id) = (from.id, to.id);
    let result: Result<(), StoreError> = store
        .run_in_tx(move |tx| {
            Box::pin(async move {
                transfer::create_transfer(&mut **tx, from_id, to_id, 25).await?;
                entry::create_entry(&mut **tx, from_id, -25).await?;
                entry::create_entry(&mut **tx, to_id, 25).await?;
                Err(StoreError::Conflict("balance step refused".to_string()))
            })
        })
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));

    for account in [&from, &to] {
        assert_eq!(entry_count(&store, account.id).await, 0);
        assert_eq!(transfer_count(&store, account.id).await, 0);
        let unchanged = store.get_account(account.id).await.unwrap();
        assert_eq!(unchanged.balance, account.balance);
    }
}

#[tokio::test]
async fn test_transfer_tx_single() {
    let store = Store::new(common::setup_test_db().await);
    let from = common::create_funded_account(&store, 500).await;
    let to = common::create_funded_account(&store, 100).await;

    let result = store
        .transfer_tx(TransferTxParams {
            from_account_id: from.id,
            to_account_id: to.id,
            amount: 75,
        })
        .await
        .unwrap();

    // transfer record
    assert_eq!(result.transfer.from_account_id, from.id);
    assert_eq!(result.transfer.to_account_id, to.id);
    assert_eq!(result.transfer.amount, 75);
    store.get_transfer(result.transfer.id).await.unwrap();

    // matched debit/credit pair
    assert_eq!(result.from_entry.account_id, from.id);
    assert_eq!(result.from_entry.amount, -75);
    assert_eq!(result.to_entry.account_id, to.id);
    assert_eq!(result.to_entry.amount, 75);
    assert_eq!(result.from_entry.amount + result.to_entry.amount, 0);
    store.get_entry(result.from_entry.id).await.unwrap();
    store.get_entry(result.to_entry.id).await.unwrap();

    // conservation
    assert_eq!(result.from_account.balance, 500 - 75);
    assert_eq!(result.to_account.balance, 100 + 75);
    assert_eq!(
        result.from_account.balance + result.to_account.balance,
        500 + 100
    );
}

#[tokio::test]
async fn test_transfer_tx_concurrent() {
    let store = Store::new(common::setup_test_db().await);
    let account1 = common::create_funded_account(&store, 1000).await;
    let account2 = common::create_funded_account(&store, 1000).await;

    let n = 5;
    let amount = 10;

    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let store = store.clone();
        let params = TransferTxParams {
            from_account_id: account1.id,
            to_account_id: account2.id,
            amount,
        };
        handles.push(tokio::spawn(async move { store.transfer_tx(params).await }));
    }

    // Each successful transfer observes a distinct intermediate balance,
    // so the deltas seen across results are exactly {amount .. n*amount}.
    let mut seen = std::collections::HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();

        assert_eq!(result.transfer.from_account_id, account1.id);
        assert_eq!(result.transfer.to_account_id, account2.id);
        assert_eq!(result.transfer.amount, amount);
        assert_eq!(result.from_entry.amount, -amount);
        assert_eq!(result.to_entry.amount, amount);

        let diff1 = account1.balance - result.from_account.balance;
        let diff2 = result.to_account.balance - account2.balance;
        assert_eq!(diff1, diff2);
        assert!(diff1 > 0);
        assert_eq!(diff1 % amount, 0);

        let k = (diff1 / amount) as usize;
        assert!((1..=n).contains(&k));
        assert!(seen.insert(k), "duplicate intermediate delta {k}");
    }

    let updated1 = store.get_account(account1.id).await.unwrap();
    let updated2 = store.get_account(account2.id).await.unwrap();
    assert_eq!(updated1.balance, account1.balance - n as i64 * amount);
    assert_eq!(updated2.balance, account2.balance + n as i64 * amount);
}

#[tokio::test]
async fn test_transfer_tx_concurrent_opposite_directions() {
    let store = Store::new(common::setup_test_db().await);
    let account1 = common::create_funded_account(&store, 1000).await;
    let account2 = common::create_funded_account(&store, 1000).await;

    // Half the transfers run 1 -> 2 and half 2 -> 1. Without lock
    // ordering this interleaving deadlocks under load.
    let n = 10;
    let amount = 10;

    let mut handles = Vec::with_capacity(n);
    for i in 0..n {
        let store = store.clone();
        let (from, to) = if i % 2 == 0 {
            (account1.id, account2.id)
        } else {
            (account2.id, account1.id)
        };
        let params = TransferTxParams {
            from_account_id: from,
            to_account_id: to,
            amount,
        };
        handles.push(tokio::spawn(async move { store.transfer_tx(params).await }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Equal counts in both directions leave balances unchanged.
    let updated1 = store.get_account(account1.id).await.unwrap();
    let updated2 = store.get_account(account2.id).await.unwrap();
    assert_eq!(updated1.balance, account1.balance);
    assert_eq!(updated2.balance, account2.balance);
}

#[tokio::test]
async fn test_transfer_tx_validation_writes_nothing() {
    let store = Store::new(common::setup_test_db().await);
    let from = common::create_funded_account(&store, 100).await;
    let to = common::create_funded_account(&store, 100).await;

    let cases = [
        TransferTxParams {
            from_account_id: from.id,
            to_account_id: to.id,
            amount: 0,
        },
        TransferTxParams {
            from_account_id: from.id,
            to_account_id: to.id,
            amount: -10,
        },
        TransferTxParams {
            from_account_id: from.id,
            to_account_id: from.id,
            amount: 10,
        },
    ];

    for params in cases {
        let result = store.transfer_tx(params).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    for account in [&from, &to] {
        assert_eq!(entry_count(&store, account.id).await, 0);
        assert_eq!(transfer_count(&store, account.id).await, 0);
        let unchanged = store.get_account(account.id).await.unwrap();
        assert_eq!(unchanged.balance, account.balance);
    }
}

#[tokio::test]
async fn test_transfer_tx_rolls_back_on_missing_account() {
    let store = Store::new(common::setup_test_db().await);
    let from = common::create_funded_account(&store, 100).await;

    let result = store
        .transfer_tx(TransferTxParams {
            from_account_id: from.id,
            to_account_id: i64::MAX,
            amount: 10,
        })
        .await;

    // The dangling account id trips a foreign key constraint.
    assert!(matches!(result, Err(StoreError::Conflict(_))));

    // Nothing from the aborted transaction survives.
    assert_eq!(entry_count(&store, from.id).await, 0);
    assert_eq!(transfer_count(&store, from.id).await, 0);
    let unchanged = store.get_account(from.id).await.unwrap();
    assert_eq!(unchanged.balance, from.balance);
}

#[tokio::test]
async fn test_transfer_tx_is_not_deduplicated() {
    let store = Store::new(common::setup_test_db().await);
    let from = common::create_funded_account(&store, 100).await;
    let to = common::create_funded_account(&store, 0).await;

    let params = TransferTxParams {
        from_account_id: from.id,
        to_account_id: to.id,
        amount: 30,
    };

    // Duplicate submission is caller policy; the engine applies both.
    let first = store.transfer_tx(params).await.unwrap();
    let second = store.transfer_tx(params).await.unwrap();
    assert_ne!(first.transfer.id, second.transfer.id);

    assert_eq!(transfer_count(&store, from.id).await, 2);
    let updated_from = store.get_account(from.id).await.unwrap();
    let updated_to = store.get_account(to.id).await.unwrap();
    assert_eq!(updated_from.balance, 100 - 2 * 30);
    assert_eq!(updated_to.balance, 2 * 30);
}
