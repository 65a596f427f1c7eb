//! Entry repository
//!
//! Append-only ledger entries. There is deliberately no update or delete
//! here: every balance change leaves a permanent audit record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;

use super::StoreError;

/// An immutable signed amount recorded against one account.
/// Negative = debit, positive = credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

type EntryRow = (i64, i64, i64, DateTime<Utc>);

impl From<EntryRow> for Entry {
    fn from((id, account_id, amount, created_at): EntryRow) -> Self {
        Self {
            id,
            account_id,
            amount,
            created_at,
        }
    }
}

/// Append one ledger entry
pub async fn create_entry(
    db: impl PgExecutor<'_>,
    account_id: i64,
    amount: i64,
) -> Result<Entry, StoreError> {
    let row: EntryRow = sqlx::query_as(
        r#"
        INSERT INTO entries (account_id, amount)
        VALUES ($1, $2)
        RETURNING id, account_id, amount, created_at
        "#,
    )
    .bind(account_id)
    .bind(amount)
    .fetch_one(db)
    .await?;

    Ok(row.into())
}

pub async fn get_entry(db: impl PgExecutor<'_>, id: i64) -> Result<Entry, StoreError> {
    let row: Option<EntryRow> = sqlx::query_as(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("entry", id))
}

/// List entries for one account, newest first
pub async fn list_entries(
    db: impl PgExecutor<'_>,
    account_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Entry>, StoreError> {
    let rows: Vec<EntryRow> = sqlx::query_as(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE account_id = $1
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
