/// API routes and handlers
pub mod matches;
pub mod middleware;
pub mod positions;
pub mod requests;
pub mod session;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(session::routes())
        .merge(requests::routes())
        .merge(positions::routes())
        .merge(matches::routes())
}
