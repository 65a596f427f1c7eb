//! Session repository
//!
//! Refresh-token sessions. Only the sha256 hash of the refresh token is
//! stored; the token itself never touches the database.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub refresh_token_hash: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

type SessionRow = (
    Uuid,
    String,
    String,
    String,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

impl From<SessionRow> for Session {
    fn from(
        (id, username, refresh_token_hash, user_agent, client_ip, is_blocked, expires_at, created_at): SessionRow,
    ) -> Self {
        Self {
            id,
            username,
            refresh_token_hash,
            user_agent,
            client_ip,
            is_blocked,
            expires_at,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub id: Uuid,
    pub username: String,
    pub refresh_token_hash: String,
    pub user_agent: String,
    pub client_ip: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn create_session(
    db: impl PgExecutor<'_>,
    params: &CreateSessionParams,
) -> Result<Session, StoreError> {
    let row: SessionRow = sqlx::query_as(
        r#"
        INSERT INTO sessions (id, username, refresh_token_hash, user_agent, client_ip, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, username, refresh_token_hash, user_agent, client_ip, is_blocked, expires_at, created_at
        "#,
    )
    .bind(params.id)
    .bind(&params.username)
    .bind(&params.refresh_token_hash)
    .bind(&params.user_agent)
    .bind(&params.client_ip)
    .bind(params.expires_at)
    .fetch_one(db)
    .await?;

    Ok(row.into())
}

pub async fn get_session(db: impl PgExecutor<'_>, id: Uuid) -> Result<Session, StoreError> {
    let row: Option<SessionRow> = sqlx::query_as(
        r#"
        SELECT id, username, refresh_token_hash, user_agent, client_ip, is_blocked, expires_at, created_at
        FROM sessions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("session", id))
}
