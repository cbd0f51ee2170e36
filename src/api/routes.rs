use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::health::{health_check, liveness_check};
use super::handlers::pnr::{provide_and_register, SharedPnrState};

pub fn pnr_routes(state: SharedPnrState) -> Router {
    Router::new()
        .route("/xds/pnr", post(provide_and_register))
        .with_state(state)
}

pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
}
