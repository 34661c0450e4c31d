//! Axum router wiring: demo routes behind the timing middleware.

use axum::{middleware as axum_mw, routing::get, Router};

use crate::{app_state::AppState, middleware, routes};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/db", get(routes::db))
        .route("/blocking", get(routes::blocking))
        .route("/fail", get(routes::fail))
        .route("/quiet", get(routes::quiet))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::server_timing,
        ))
        .with_state(state)
}
