//! API module

pub mod middleware;
pub mod routes;

use axum::Router;

use crate::config::Config;
use crate::store::Store;
use crate::token::TokenMaker;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub tokens: TokenMaker,
    pub config: Config,
}

/// Create the application router: public auth routes plus bearer-token
/// protected account/transfer/entry routes.
pub fn create_router(state: AppState) -> Router {
    routes::create_router(state)
}
