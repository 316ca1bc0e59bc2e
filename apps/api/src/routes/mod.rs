pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Companies and their hiring rounds
        .route("/api/v1/companies", post(handlers::handle_create_company))
        .route("/api/v1/companies/:id", get(handlers::handle_get_company))
        .route(
            "/api/v1/companies/:id/uploads",
            post(handlers::handle_upload_roster),
        )
        .route(
            "/api/v1/companies/:id/roster",
            get(handlers::handle_roster_report),
        )
        .route(
            "/api/v1/companies/:id/rounds/:index/eligible",
            get(handlers::handle_get_eligible),
        )
        .route(
            "/api/v1/companies/:id/rounds/:index/eligible/recover",
            post(handlers::handle_recover_eligible),
        )
        .route(
            "/api/v1/companies/:id/rounds/:index/selection",
            put(handlers::handle_record_selection),
        )
        .route(
            "/api/v1/companies/:id/rounds/:index/status",
            post(handlers::handle_round_status),
        )
        .route(
            "/api/v1/companies/:id/finalize",
            post(handlers::handle_finalize),
        )
        // Training roster and placed directory
        .route(
            "/api/v1/training-roster/:institution",
            put(handlers::handle_load_training_roster),
        )
        .route("/api/v1/placed", get(handlers::handle_list_placed))
        .with_state(state)
}
