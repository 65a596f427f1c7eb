//! Account repository
//!
//! Point reads, a locking read, and the atomic signed-balance increment.
//! The balance column is mutated only through `add_account_balance`; no
//! code path reads a balance and writes it back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;

use super::StoreError;

/// A single ledger account. Balance is in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

type AccountRow = (i64, String, i64, String, DateTime<Utc>);

impl From<AccountRow> for Account {
    fn from((id, owner, balance, currency, created_at): AccountRow) -> Self {
        Self {
            id,
            owner,
            balance,
            currency,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: String,
}

/// Create a new account
pub async fn create_account(
    db: impl PgExecutor<'_>,
    params: &CreateAccountParams,
) -> Result<Account, StoreError> {
    let row: AccountRow = sqlx::query_as(
        r#"
        INSERT INTO accounts (owner, balance, currency)
        VALUES ($1, $2, $3)
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(&params.owner)
    .bind(params.balance)
    .bind(&params.currency)
    .fetch_one(db)
    .await?;

    Ok(row.into())
}

/// Snapshot read, no lock. Usable outside a transfer transaction.
pub async fn get_account(db: impl PgExecutor<'_>, id: i64) -> Result<Account, StoreError> {
    let row: Option<AccountRow> = sqlx::query_as(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("account", id))
}

/// Read holding an exclusive row lock until the enclosing transaction
/// ends. Only meaningful when called with a transaction handle.
pub async fn get_account_for_update(
    db: impl PgExecutor<'_>,
    id: i64,
) -> Result<Account, StoreError> {
    let row: Option<AccountRow> = sqlx::query_as(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("account", id))
}

/// Atomically add `delta` (may be negative) to the stored balance and
/// return the updated row. The single UPDATE takes the row lock itself,
/// so there is no read-modify-write window.
pub async fn add_account_balance(
    db: impl PgExecutor<'_>,
    id: i64,
    delta: i64,
) -> Result<Account, StoreError> {
    let row: Option<AccountRow> = sqlx::query_as(
        r#"
        UPDATE accounts
        SET balance = balance + $2
        WHERE id = $1
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("account", id))
}

/// List accounts belonging to one owner, newest id first
pub async fn list_accounts(
    db: impl PgExecutor<'_>,
    owner: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Account>, StoreError> {
    let rows: Vec<AccountRow> = sqlx::query_as(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        WHERE owner = $1
        ORDER BY id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(owner)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Delete an account. Fails with a conflict while ledger rows reference it.
pub async fn delete_account(db: impl PgExecutor<'_>, id: i64) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("account", id));
    }
    Ok(())
}
