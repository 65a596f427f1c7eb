//! minibank Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod config;
pub mod db;
mod error;
pub mod password;
pub mod store;
pub mod token;

pub use api::AppState;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use store::{Store, StoreError, TransferTxParams, TransferTxResult};
pub use token::TokenMaker;
