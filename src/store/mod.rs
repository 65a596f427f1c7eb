//! Store
//!
//! Persistence layer: repositories over PostgreSQL plus the composite
//! transfer transaction. Correctness under concurrent use relies on
//! database transactions and row locks, never on in-process locking.

use std::future::Future;
use std::pin::Pin;

use sqlx::{PgPool, Postgres, Transaction};

pub mod account;
pub mod entry;
mod error;
pub mod session;
pub mod transfer;
pub mod user;

pub use account::{Account, CreateAccountParams};
pub use entry::Entry;
pub use error::StoreError;
pub use session::{CreateSessionParams, Session};
pub use transfer::Transfer;
pub use user::{CreateUserParams, UpdateUserParams, User};

/// Future returned by a transactional unit of work.
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 't>>;

/// Parameters for one fund transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

/// Everything created or mutated by one successful transfer
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

/// Handle to the persistence layer. Cheap to clone; all state lives in
/// the connection pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `work` inside one database transaction: commit on `Ok`, roll
    /// back on `Err`. The work's result or error is returned unchanged.
    /// If `work` panics, the dropped transaction rolls back on its own,
    /// so no connection is leaked holding locks.
    pub async fn run_in_tx<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Transaction<'static, Postgres>) -> TxFuture<'t, T> + Send,
    {
        let mut tx = self.pool.begin().await?;

        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Move `amount` from one account to the other: one transfer record,
    /// a matched debit/credit entry pair, and both balance updates, all
    /// in a single transaction.
    ///
    /// Balance updates always touch the lower-numbered account first.
    /// Two transfers running in opposite directions over the same pair
    /// would otherwise acquire the two row locks in reverse orders and
    /// produce a lock-wait cycle; ordering by account id removes it.
    pub async fn transfer_tx(
        &self,
        params: TransferTxParams,
    ) -> Result<TransferTxResult, StoreError> {
        if params.amount <= 0 {
            return Err(StoreError::validation("transfer amount must be positive"));
        }
        if params.from_account_id == params.to_account_id {
            return Err(StoreError::validation(
                "from_account_id and to_account_id must differ",
            ));
        }

        self.run_in_tx(move |tx| {
            Box::pin(async move {
                let transfer = transfer::create_transfer(
                    &mut **tx,
                    params.from_account_id,
                    params.to_account_id,
                    params.amount,
                )
                .await?;

                let from_entry =
                    entry::create_entry(&mut **tx, params.from_account_id, -params.amount).await?;
                let to_entry =
                    entry::create_entry(&mut **tx, params.to_account_id, params.amount).await?;

                let (from_account, to_account) =
                    if params.from_account_id < params.to_account_id {
                        let from = account::add_account_balance(
                            &mut **tx,
                            params.from_account_id,
                            -params.amount,
                        )
                        .await?;
                        let to = account::add_account_balance(
                            &mut **tx,
                            params.to_account_id,
                            params.amount,
                        )
                        .await?;
                        (from, to)
                    } else {
                        let to = account::add_account_balance(
                            &mut **tx,
                            params.to_account_id,
                            params.amount,
                        )
                        .await?;
                        let from = account::add_account_balance(
                            &mut **tx,
                            params.from_account_id,
                            -params.amount,
                        )
                        .await?;
                        (from, to)
                    };

                Ok(TransferTxResult {
                    transfer,
                    from_entry,
                    to_entry,
                    from_account,
                    to_account,
                })
            })
        })
        .await
    }

    // Pool-level pass-throughs used by the API layer.

    pub async fn create_account(&self, params: &CreateAccountParams) -> Result<Account, StoreError> {
        account::create_account(&self.pool, params).await
    }

    pub async fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        account::get_account(&self.pool, id).await
    }

    pub async fn list_accounts(
        &self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, StoreError> {
        account::list_accounts(&self.pool, owner, limit, offset).await
    }

    pub async fn delete_account(&self, id: i64) -> Result<(), StoreError> {
        account::delete_account(&self.pool, id).await
    }

    pub async fn get_entry(&self, id: i64) -> Result<Entry, StoreError> {
        entry::get_entry(&self.pool, id).await
    }

    pub async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>, StoreError> {
        entry::list_entries(&self.pool, account_id, limit, offset).await
    }

    pub async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError> {
        transfer::get_transfer(&self.pool, id).await
    }

    pub async fn list_transfers(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, StoreError> {
        transfer::list_transfers(&self.pool, account_id, limit, offset).await
    }

    pub async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        user::create_user(&self.pool, params).await
    }

    pub async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        user::get_user(&self.pool, username).await
    }

    pub async fn update_user(
        &self,
        username: &str,
        params: &UpdateUserParams,
    ) -> Result<User, StoreError> {
        user::update_user(&self.pool, username, params).await
    }

    pub async fn create_session(&self, params: &CreateSessionParams) -> Result<Session, StoreError> {
        session::create_session(&self.pool, params).await
    }

    pub async fn get_session(&self, id: uuid::Uuid) -> Result<Session, StoreError> {
        session::get_session(&self.pool, id).await
    }
}
