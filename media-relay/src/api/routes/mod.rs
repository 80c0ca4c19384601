//! API route modules.

pub mod convert;
pub mod documents;
pub mod download;
pub mod health;

use axum::Router;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(download::router())
        .merge(convert::router())
        .merge(documents::router())
        .nest("/health", health::router())
        .with_state(state)
}
