//! Transfer repository
//!
//! Append-only transfer records tying two accounts to a positive amount.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

type TransferRow = (i64, i64, i64, i64, DateTime<Utc>);

impl From<TransferRow> for Transfer {
    fn from((id, from_account_id, to_account_id, amount, created_at): TransferRow) -> Self {
        Self {
            id,
            from_account_id,
            to_account_id,
            amount,
            created_at,
        }
    }
}

/// Append one transfer record
pub async fn create_transfer(
    db: impl PgExecutor<'_>,
    from_account_id: i64,
    to_account_id: i64,
    amount: i64,
) -> Result<Transfer, StoreError> {
    let row: TransferRow = sqlx::query_as(
        r#"
        INSERT INTO transfers (from_account_id, to_account_id, amount)
        VALUES ($1, $2, $3)
        RETURNING id, from_account_id, to_account_id, amount, created_at
        "#,
    )
    .bind(from_account_id)
    .bind(to_account_id)
    .bind(amount)
    .fetch_one(db)
    .await?;

    Ok(row.into())
}

pub async fn get_transfer(db: impl PgExecutor<'_>, id: i64) -> Result<Transfer, StoreError> {
    let row: Option<TransferRow> = sqlx::query_as(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("transfer", id))
}

/// List transfers touching one account on either side, newest first
pub async fn list_transfers(
    db: impl PgExecutor<'_>,
    account_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transfer>, StoreError> {
    let rows: Vec<TransferRow> = sqlx::query_as(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE from_account_id = $1 OR to_account_id = $1
        ORDER BY id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}
