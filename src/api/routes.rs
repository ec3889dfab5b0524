use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware};
use crate::AppState;

/// Assemble the method surface with its middleware chain.
///
/// Layers wrap inside-out: metrics sits closest to the handlers, then
/// auth, then logging, with panic recovery outermost so it covers every
/// other layer.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/user/login", post(handlers::login))
        .route("/user/logout", post(handlers::logout))
        .route("/user/profile", post(handlers::get_profile))
        .route("/user/nickname", post(handlers::update_nickname))
        .route("/user/profile_picture", post(handlers::update_profile_picture))
        .layer(axum_middleware::from_fn(middleware::record_metrics))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::auth,
        ))
        .layer(axum_middleware::from_fn(middleware::logging))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
        .with_state(state)
}
