//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::password;
use crate::store::{
    Account, CreateAccountParams, CreateSessionParams, CreateUserParams, Entry, StoreError,
    Transfer, TransferTxParams, TransferTxResult, User,
};
use crate::token;

use super::middleware::AuthUser;
use super::AppState;

/// Currencies accounts may be denominated in
const SUPPORTED_CURRENCIES: &[&str] = &["USD", "EUR", "BRL"];

fn is_supported_currency(currency: &str) -> bool {
    SUPPORTED_CURRENCIES.contains(&currency)
}

const MAX_PAGE_SIZE: i64 = 20;

fn page_offset(page_id: i64, page_size: i64) -> Result<i64, AppError> {
    if page_id < 1 {
        return Err(AppError::InvalidRequest("page_id must be >= 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(AppError::InvalidRequest(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    page_id
        .checked_sub(1)
        .and_then(|page| page.checked_mul(page_size))
        .ok_or_else(|| AppError::InvalidRequest("page_id is out of range".to_string()))
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            password_changed_at: user.password_changed_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginUserResponse {
    pub session_id: Uuid,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenewTokenRequest {
    pub session_id: Uuid,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenewTokenResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    pub page_id: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    pub account_id: i64,
    pub page_id: i64,
    pub page_size: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListTransfersQuery {
    pub account_id: i64,
    pub page_id: i64,
    pub page_size: i64,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/:id", get(get_account).delete(delete_account))
        .route("/transfers", post(create_transfer).get(list_transfers))
        .route("/transfers/:id", get(get_transfer))
        .route("/entries", get(list_entries))
        .route("/entries/:id", get(get_entry))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            super::middleware::auth_middleware,
        ));

    Router::new()
        .route("/users", post(create_user))
        .route("/users/login", post(login_user))
        .route("/tokens/renew", post(renew_access_token))
        .merge(protected)
        .layer(middleware::from_fn(super::middleware::logging_middleware))
        .with_state(state)
}

// =========================================================================
// POST /users
// =========================================================================

/// Register a new user
async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    if request.username.is_empty() || !request.username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidRequest(
            "username must be non-empty and alphanumeric".to_string(),
        ));
    }
    if request.password.len() < 6 {
        return Err(AppError::InvalidRequest(
            "password must be at least 6 characters".to_string(),
        ));
    }
    if !request.email.contains('@') {
        return Err(AppError::InvalidRequest("invalid email".to_string()));
    }
    if request.full_name.is_empty() {
        return Err(AppError::InvalidRequest(
            "full_name must not be empty".to_string(),
        ));
    }

    let hashed_password = password::hash_password(&request.password)?;

    let user = state
        .store
        .create_user(&CreateUserParams {
            username: request.username,
            hashed_password,
            full_name: request.full_name,
            email: request.email,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

// =========================================================================
// POST /users/login
// =========================================================================

/// Verify credentials and open a refresh-token session
async fn login_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginUserRequest>,
) -> Result<Json<LoginUserResponse>, AppError> {
    let user = state.store.get_user(&request.username).await?;

    password::verify_password(&request.password, &user.hashed_password)?;

    let (access_token, claims) = state.tokens.create_token(
        &user.username,
        Duration::seconds(state.config.access_token_ttl_secs),
    )?;

    let refresh_token = token::new_refresh_token();
    let refresh_expires_at = Utc::now() + Duration::seconds(state.config.refresh_token_ttl_secs);

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let session = state
        .store
        .create_session(&CreateSessionParams {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            refresh_token_hash: token::hash_refresh_token(&refresh_token),
            user_agent,
            client_ip,
            expires_at: refresh_expires_at,
        })
        .await?;

    Ok(Json(LoginUserResponse {
        session_id: session.id,
        access_token,
        access_token_expires_at: claims.expires_at(),
        refresh_token,
        refresh_token_expires_at: session.expires_at,
        user: user.into(),
    }))
}

// =========================================================================
// POST /tokens/renew
// =========================================================================

/// Exchange a refresh token for a new access token
async fn renew_access_token(
    State(state): State<AppState>,
    Json(request): Json<RenewTokenRequest>,
) -> Result<Json<RenewTokenResponse>, AppError> {
    let session = state
        .store
        .get_session(request.session_id)
        .await
        .map_err(|err| match err {
            StoreError::NotFound { .. } => AppError::SessionInvalid,
            other => other.into(),
        })?;

    if session.is_blocked || session.expires_at < Utc::now() {
        return Err(AppError::SessionInvalid);
    }
    if token::hash_refresh_token(&request.refresh_token) != session.refresh_token_hash {
        return Err(AppError::SessionInvalid);
    }

    let (access_token, claims) = state.tokens.create_token(
        &session.username,
        Duration::seconds(state.config.access_token_ttl_secs),
    )?;

    Ok(Json(RenewTokenResponse {
        access_token,
        access_token_expires_at: claims.expires_at(),
    }))
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Open an account for the authenticated user
async fn create_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    if !is_supported_currency(&request.currency) {
        return Err(AppError::InvalidRequest(format!(
            "unsupported currency: {}",
            request.currency
        )));
    }

    let account = state
        .store
        .create_account(&CreateAccountParams {
            owner: auth.username,
            balance: 0,
            currency: request.currency,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

// =========================================================================
// GET /accounts/:id
// =========================================================================

/// Get one of the authenticated user's accounts
async fn get_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Account>, AppError> {
    let account = state.store.get_account(id).await?;
    if account.owner != auth.username {
        return Err(AppError::Forbidden);
    }
    Ok(Json(account))
}

// =========================================================================
// GET /accounts
// =========================================================================

/// List the authenticated user's accounts
async fn list_accounts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<Vec<Account>>, AppError> {
    let offset = page_offset(query.page_id, query.page_size)?;
    let accounts = state
        .store
        .list_accounts(&auth.username, query.page_size, offset)
        .await?;
    Ok(Json(accounts))
}

// =========================================================================
// DELETE /accounts/:id
// =========================================================================

/// Delete one of the authenticated user's accounts. Fails with a conflict
/// while ledger rows still reference it.
async fn delete_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let account = state.store.get_account(id).await?;
    if account.owner != auth.username {
        return Err(AppError::Forbidden);
    }

    state.store.delete_account(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// POST /transfers
// =========================================================================

/// Transfer between two accounts of the request currency. The source
/// account must belong to the authenticated user.
async fn create_transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<CreateTransferRequest>,
) -> Result<Json<TransferTxResult>, AppError> {
    let from_account = valid_account(&state, request.from_account_id, &request.currency).await?;
    if from_account.owner != auth.username {
        return Err(AppError::Forbidden);
    }
    valid_account(&state, request.to_account_id, &request.currency).await?;

    let result = state
        .store
        .transfer_tx(TransferTxParams {
            from_account_id: request.from_account_id,
            to_account_id: request.to_account_id,
            amount: request.amount,
        })
        .await?;

    Ok(Json(result))
}

/// Check the account exists and carries the expected currency
async fn valid_account(
    state: &AppState,
    account_id: i64,
    currency: &str,
) -> Result<Account, AppError> {
    let account = state.store.get_account(account_id).await?;
    if account.currency != currency {
        return Err(AppError::InvalidRequest(format!(
            "account {} currency mismatch: {} vs {}",
            account.id, account.currency, currency
        )));
    }
    Ok(account)
}

// =========================================================================
// GET /transfers/:id
// =========================================================================

/// Get transfer details
async fn get_transfer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Transfer>, AppError> {
    let transfer = state.store.get_transfer(id).await?;
    Ok(Json(transfer))
}

// =========================================================================
// GET /transfers
// =========================================================================

/// List transfers touching one of the authenticated user's accounts,
/// in either direction
async fn list_transfers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListTransfersQuery>,
) -> Result<Json<Vec<Transfer>>, AppError> {
    let offset = page_offset(query.page_id, query.page_size)?;

    let account = state.store.get_account(query.account_id).await?;
    if account.owner != auth.username {
        return Err(AppError::Forbidden);
    }

    let transfers = state
        .store
        .list_transfers(query.account_id, query.page_size, offset)
        .await?;
    Ok(Json(transfers))
}

// =========================================================================
// GET /entries
// =========================================================================

/// List ledger entries for one of the authenticated user's accounts
async fn list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<Entry>>, AppError> {
    let offset = page_offset(query.page_id, query.page_size)?;

    let account = state.store.get_account(query.account_id).await?;
    if account.owner != auth.username {
        return Err(AppError::Forbidden);
    }

    let entries = state
        .store
        .list_entries(query.account_id, query.page_size, offset)
        .await?;
    Ok(Json(entries))
}

// =========================================================================
// GET /entries/:id
// =========================================================================

/// Get a single ledger entry. Ownership follows the account the entry
/// belongs to.
async fn get_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Entry>, AppError> {
    let entry = state.store.get_entry(id).await?;

    let account = state.store.get_account(entry.account_id).await?;
    if account.owner != auth.username {
        return Err(AppError::Forbidden);
    }

    Ok(Json(entry))
}
