pub(crate) mod authorizer;
pub(crate) mod handler;
pub(crate) mod health;

use crate::state::AppState;
use axum::Router;

/// Combines all API routes into a single router
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(authorizer::router())
        .merge(handler::router())
}
