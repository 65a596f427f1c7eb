//! Common test utilities
#![allow(dead_code)]

use rand::{distributions::Alphanumeric, Rng};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use minibank::password;
use minibank::store::{Account, CreateAccountParams, CreateUserParams, Store, User};

/// Connect to the test database. Tests use randomized fixtures instead of
/// truncation so test binaries can run concurrently.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB")
}

pub fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

pub fn random_username() -> String {
    format!("user{}", random_suffix())
}

pub fn random_balance() -> i64 {
    rand::thread_rng().gen_range(100..=1000)
}

pub async fn create_test_user(store: &Store) -> User {
    let username = random_username();
    store
        .create_user(&CreateUserParams {
            username: username.clone(),
            hashed_password: password::hash_password("secret123").unwrap(),
            full_name: "Test User".to_string(),
            email: format!("{username}@example.com"),
        })
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_account(store: &Store, owner: &str, balance: i64) -> Account {
    store
        .create_account(&CreateAccountParams {
            owner: owner.to_string(),
            balance,
            currency: "USD".to_string(),
        })
        .await
        .expect("Failed to create test account")
}

/// One fresh user with one USD account
pub async fn create_funded_account(store: &Store, balance: i64) -> Account {
    let user = create_test_user(store).await;
    create_test_account(store, &user.username, balance).await
}
