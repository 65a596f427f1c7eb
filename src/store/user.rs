//! User repository

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

type UserRow = (String, String, String, String, DateTime<Utc>, DateTime<Utc>);

impl From<UserRow> for User {
    fn from(
        (username, hashed_password, full_name, email, password_changed_at, created_at): UserRow,
    ) -> Self {
        Self {
            username,
            hashed_password,
            full_name,
            email,
            password_changed_at,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
}

/// Partial update; `None` fields are left untouched. A new password also
/// bumps `password_changed_at`.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
}

pub async fn create_user(
    db: impl PgExecutor<'_>,
    params: &CreateUserParams,
) -> Result<User, StoreError> {
    let row: UserRow = sqlx::query_as(
        r#"
        INSERT INTO users (username, hashed_password, full_name, email)
        VALUES ($1, $2, $3, $4)
        RETURNING username, hashed_password, full_name, email, password_changed_at, created_at
        "#,
    )
    .bind(&params.username)
    .bind(&params.hashed_password)
    .bind(&params.full_name)
    .bind(&params.email)
    .fetch_one(db)
    .await?;

    Ok(row.into())
}

pub async fn get_user(db: impl PgExecutor<'_>, username: &str) -> Result<User, StoreError> {
    let row: Option<UserRow> = sqlx::query_as(
        r#"
        SELECT username, hashed_password, full_name, email, password_changed_at, created_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("user", username))
}

pub async fn update_user(
    db: impl PgExecutor<'_>,
    username: &str,
    params: &UpdateUserParams,
) -> Result<User, StoreError> {
    let row: Option<UserRow> = sqlx::query_as(
        r#"
        UPDATE users
        SET full_name = COALESCE($2, full_name),
            email = COALESCE($3, email),
            hashed_password = COALESCE($4, hashed_password),
            password_changed_at = CASE WHEN $4 IS NULL THEN password_changed_at ELSE now() END
        WHERE username = $1
        RETURNING username, hashed_password, full_name, email, password_changed_at, created_at
        "#,
    )
    .bind(username)
    .bind(&params.full_name)
    .bind(&params.email)
    .bind(&params.hashed_password)
    .fetch_optional(db)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| StoreError::not_found("user", username))
}
