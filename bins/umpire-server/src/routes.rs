use std::sync::Arc;

use axum::routing::post;
use axum::Router;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/judge", post(handlers::judge))
        .route("/run", post(handlers::run))
        .route("/execute", post(handlers::execute))
        .route("/validate", post(handlers::validate))
}
